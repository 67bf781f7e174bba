//! Beat and bar phase tracking.
//!
//! A simplified phase-locked loop: phases advance from the tempo estimate
//! each tick, and detected onsets nudge the beat phase toward the assumed
//! downbeat with a fixed correction gain.

use tracing::trace;

/// Correction gain applied to the beat phase on a confident onset
const CORRECTION_GAIN: f64 = 0.3;

/// Minimum tempo confidence required before onsets correct the phase
const CONFIDENCE_GATE: f32 = 0.3;

/// Beats per bar
const BEATS_PER_BAR: f64 = 4.0;

/// Predicts beat/bar phase from tempo and corrects it on onsets
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker {
    beat_phase: f64,
    bar_phase: f64,
    current_bar: u64,
}

impl PhaseTracker {
    /// Create a tracker at phase zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance both phases by `dt_ms` at the given tempo
    ///
    /// Phases stay in `[0, 1)` for any `dt_ms`, including zero, negative
    /// and multi-beat deltas.
    pub fn advance(&mut self, dt_ms: f64, tempo_bpm: f32) {
        if tempo_bpm <= 0.0 {
            return;
        }
        let beat_period_ms = 60_000.0 / tempo_bpm as f64;

        let prev_beat = self.beat_phase;
        let prev_bar = self.bar_phase;
        self.beat_phase = (self.beat_phase + dt_ms / beat_period_ms).rem_euclid(1.0);
        self.bar_phase =
            (self.bar_phase + dt_ms / (beat_period_ms * BEATS_PER_BAR)).rem_euclid(1.0);

        let beat_wrapped = self.beat_phase < prev_beat;
        let bar_wrapped = self.bar_phase < prev_bar;
        // The beat wrap can land one tick late of the bar wrap under float
        // accumulation; a near-zero beat phase counts as wrapped.
        if bar_wrapped && (beat_wrapped || self.beat_phase < 0.1) {
            self.current_bar += 1;
        }
    }

    /// Nudge the beat phase toward the assumed downbeat
    ///
    /// Applied on detected onsets; ignored while the tempo confidence is
    /// at or below the gate.
    pub fn correct(&mut self, confidence: f32) {
        if confidence <= CONFIDENCE_GATE {
            return;
        }
        self.beat_phase =
            (self.beat_phase + CORRECTION_GAIN * (0.0 - self.beat_phase) + 1.0).rem_euclid(1.0);
        trace!("phase corrected to {:.3}", self.beat_phase);
    }

    /// Beat phase in `[0, 1)`
    pub fn beat_phase(&self) -> f64 {
        self.beat_phase
    }

    /// Bar phase in `[0, 1)`
    pub fn bar_phase(&self) -> f64 {
        self.bar_phase
    }

    /// Number of completed bars since start
    pub fn current_bar(&self) -> u64 {
        self.current_bar
    }

    /// Return to phase zero for a source change
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_at_120_bpm() {
        let mut tracker = PhaseTracker::new();

        // 100 ms at 120 BPM is a fifth of a 500 ms beat
        tracker.advance(100.0, 120.0);
        assert!((tracker.beat_phase() - 0.2).abs() < 1e-9);
        assert!((tracker.bar_phase() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_bar_counter_increments_on_joint_wrap() {
        let mut tracker = PhaseTracker::new();

        // 8.05 s at 120 BPM spans four 2-second bars
        for _ in 0..80 {
            tracker.advance(100.0, 120.0);
        }
        tracker.advance(50.0, 120.0);

        assert_eq!(tracker.current_bar(), 4);
    }

    #[test]
    fn test_beat_wrap_alone_does_not_count_a_bar() {
        let mut tracker = PhaseTracker::new();

        // One full beat: beat phase wraps, bar phase reaches only 0.25
        for _ in 0..5 {
            tracker.advance(100.0, 120.0);
        }
        assert_eq!(tracker.current_bar(), 0);
    }

    #[test]
    fn test_correction_pulls_toward_downbeat() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(400.0, 120.0); // phase 0.8

        tracker.correct(0.9);
        assert!((tracker.beat_phase() - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_correction_gated_on_low_confidence() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(400.0, 120.0);

        tracker.correct(0.2);
        assert!((tracker.beat_phase() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tempo_is_ignored() {
        let mut tracker = PhaseTracker::new();
        tracker.advance(100.0, 0.0);
        assert_eq!(tracker.beat_phase(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_phases_stay_in_unit_range(
            deltas in proptest::collection::vec(-10_000.0f64..1_000_000.0, 1..100),
            tempo in 60.0f32..180.0,
        ) {
            let mut tracker = PhaseTracker::new();
            for dt in deltas {
                tracker.advance(dt, tempo);
                prop_assert!((0.0..1.0).contains(&tracker.beat_phase()));
                prop_assert!((0.0..1.0).contains(&tracker.bar_phase()));
            }
        }

        #[test]
        fn prop_correction_keeps_unit_range(steps in proptest::collection::vec(0.0f64..900.0, 1..50)) {
            let mut tracker = PhaseTracker::new();
            for dt in steps {
                tracker.advance(dt, 128.0);
                tracker.correct(1.0);
                prop_assert!((0.0..1.0).contains(&tracker.beat_phase()));
            }
        }
    }
}
