//! Flux-based onset detection over the spectral analysis tick.

use serde::{Deserialize, Serialize};

/// Configuration for [`OnsetDetector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnsetConfig {
    /// Scale applied to the preceding tick's energy to form the flux threshold
    pub threshold_multiplier: f32,
    /// Energy floor below which a tick is treated as silence
    pub min_energy: f32,
    /// Refractory interval between onsets in milliseconds
    pub min_onset_interval_ms: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            threshold_multiplier: 1.5,
            min_energy: 0.01,
            min_onset_interval_ms: 100.0,
        }
    }
}

/// Result of one detector tick
#[derive(Debug, Clone, Copy, Default)]
pub struct OnsetFrame {
    /// Mean linear magnitude across all bins
    pub energy: f32,
    /// Positive spectral flux relative to the previous tick
    pub flux: f32,
    /// Whether an onset fired this tick
    pub is_onset: bool,
}

/// Flux-based beat-event detector
///
/// The flux threshold scales with the preceding tick's energy rather than
/// being fixed, so sustained loud passages do not double-trigger and quiet
/// passages still register transients.
#[derive(Debug, Clone)]
pub struct OnsetDetector {
    config: OnsetConfig,
    previous_energy: f32,
    last_onset_ms: Option<f64>,
}

impl OnsetDetector {
    /// Create a detector with the given configuration
    pub fn new(config: OnsetConfig) -> Self {
        Self {
            config,
            previous_energy: 0.0,
            last_onset_ms: None,
        }
    }

    /// Process one magnitude frame
    ///
    /// `timestamp_ms` must not move backwards across calls. A tick with no
    /// onset is a normal `false` result, never an error.
    pub fn process(&mut self, timestamp_ms: f64, magnitudes: &[f32]) -> OnsetFrame {
        let energy = if magnitudes.is_empty() {
            0.0
        } else {
            magnitudes.iter().sum::<f32>() / magnitudes.len() as f32
        };

        let flux = (energy - self.previous_energy).max(0.0);

        let refractory_over = match self.last_onset_ms {
            Some(last) => timestamp_ms - last >= self.config.min_onset_interval_ms,
            None => true,
        };

        let is_onset = flux > self.previous_energy * self.config.threshold_multiplier
            && energy > self.config.min_energy
            && refractory_over;

        self.previous_energy = energy;
        if is_onset {
            self.last_onset_ms = Some(timestamp_ms);
        }

        OnsetFrame {
            energy,
            flux,
            is_onset,
        }
    }

    /// Clear detector state for a source change
    pub fn reset(&mut self) {
        self.previous_energy = 0.0;
        self.last_onset_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(level: f32) -> Vec<f32> {
        vec![level; 64]
    }

    #[test]
    fn test_onset_on_energy_jump() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());

        assert!(!detector.process(0.0, &frame(0.02)).is_onset);
        let result = detector.process(100.0, &frame(0.5));
        assert!(result.is_onset, "jump from quiet to loud should fire");
        assert!((result.energy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_no_onset_below_energy_floor() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());

        assert!(!detector.process(0.0, &frame(0.001)).is_onset);
        // Still below the 0.01 floor despite a large relative jump
        assert!(!detector.process(100.0, &frame(0.009)).is_onset);
    }

    #[test]
    fn test_no_double_trigger_on_sustained_level() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());

        detector.process(0.0, &frame(0.02));
        assert!(detector.process(100.0, &frame(0.5)).is_onset);
        // Sustained level: flux is zero, no retrigger
        assert!(!detector.process(200.0, &frame(0.5)).is_onset);
        assert!(!detector.process(300.0, &frame(0.5)).is_onset);
    }

    #[test]
    fn test_refractory_interval() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());

        detector.process(0.0, &frame(0.02));
        assert!(detector.process(50.0, &frame(0.5)).is_onset);
        detector.process(100.0, &frame(0.02));
        // Large flux again, but only 60 ms since the last onset
        assert!(!detector.process(110.0, &frame(0.5)).is_onset);
        detector.process(140.0, &frame(0.02));
        // 100 ms elapsed, allowed again
        assert!(detector.process(150.0, &frame(0.5)).is_onset);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());

        detector.process(0.0, &frame(0.5));
        detector.reset();

        // After reset the previous energy is zero again, so a loud frame
        // fires immediately regardless of the earlier onset time.
        assert!(detector.process(10.0, &frame(0.5)).is_onset);
    }
}
