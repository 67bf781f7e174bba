//! Morph scheduler state machine.
//!
//! Content frames arrive from an external producer at an unpredictable
//! rate. The scheduler blends between a pair of active frames over a
//! fixed-duration phase and integrates a freshly arrived frame only at a
//! phase boundary, so new content never causes a visible jump mid-blend.

use crate::morph::frame::ContentFrame;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default duration of one morph phase in milliseconds
pub const PHASE_DURATION_MS: f64 = 60_000.0;
/// Default duration of a content transition blend in milliseconds
pub const TRANSITION_DURATION_MS: f64 = 1_500.0;
/// Default tolerance window around a phase boundary in milliseconds
pub const BOUNDARY_TOLERANCE_MS: f64 = 100.0;
/// Default DNA vector length accepted at the ingestion boundary
pub const DEFAULT_DNA_LEN: usize = 64;

/// Scheduler phase names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MorphPhase {
    /// No content yet, or after a reset
    Idle,
    /// Blending between the two active frames
    Morphing,
    /// A fresh frame is queued, waiting for a phase boundary
    PendingTransition,
    /// Blending the queued frame into the active pair
    Transitioning,
}

/// Configuration for [`MorphScheduler`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Duration of one morph phase in milliseconds
    pub phase_duration_ms: f64,
    /// Duration of a content transition blend in milliseconds
    pub transition_duration_ms: f64,
    /// Tolerance window around a phase boundary in milliseconds
    pub boundary_tolerance_ms: f64,
    /// DNA vector length accepted at the ingestion boundary
    pub dna_len: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            phase_duration_ms: PHASE_DURATION_MS,
            transition_duration_ms: TRANSITION_DURATION_MS,
            boundary_tolerance_ms: BOUNDARY_TOLERANCE_MS,
            dna_len: DEFAULT_DNA_LEN,
        }
    }
}

/// Active frame pair exposed to the renderer
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFrames<'a> {
    /// Blend source frame
    pub frame_a: &'a ContentFrame,
    /// Blend target frame
    pub frame_b: &'a ContentFrame,
    /// Visual interpolation parameter between the two frames
    pub progress: f64,
    /// Whether a content transition is currently blending in
    pub is_transitioning: bool,
}

/// Boundary-gated content scheduler
///
/// Driven by the host render loop through [`MorphScheduler::tick`]; time
/// is passed in explicitly so tests can simulate arbitrary sequences.
pub struct MorphScheduler {
    config: SchedulerConfig,
    phase: MorphPhase,
    frame_a: Option<ContentFrame>,
    frame_b: Option<ContentFrame>,
    pending_frame: Option<ContentFrame>,
    now_ms: f64,
    phase_start_ms: f64,
    morph_progress: f64,
    cycle_count: u64,
    transition_start_ms: Option<f64>,
}

impl MorphScheduler {
    /// Create a scheduler in the idle state
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            phase: MorphPhase::Idle,
            frame_a: None,
            frame_b: None,
            pending_frame: None,
            now_ms: 0.0,
            phase_start_ms: 0.0,
            morph_progress: 0.0,
            cycle_count: 0,
            transition_start_ms: None,
        }
    }

    /// Accept a fresh content frame from the producer
    ///
    /// Validated at the boundary: the DNA vector must have the configured
    /// length and the asset reference must be present. While a frame is
    /// already queued, the most recently enqueued frame wins and older
    /// pending content is discarded; the scheduler never buffers a queue.
    pub fn enqueue_fresh_frame(&mut self, frame: ContentFrame) -> Result<()> {
        if frame.dna.len() != self.config.dna_len {
            return Err(CoreError::InvalidFrame(format!(
                "DNA vector length {} (expected {})",
                frame.dna.len(),
                self.config.dna_len
            )));
        }
        if frame.asset.is_empty() {
            return Err(CoreError::InvalidFrame("missing asset reference".into()));
        }

        match self.phase {
            MorphPhase::Idle => {
                if self.frame_a.is_none() {
                    self.frame_a = Some(frame);
                } else {
                    self.frame_b = Some(frame);
                    self.phase_start_ms = self.now_ms;
                    self.morph_progress = 0.0;
                    self.phase = MorphPhase::Morphing;
                    debug!("morphing started");
                }
            }
            MorphPhase::Morphing => {
                if self.pending_frame.is_none() {
                    self.pending_frame = Some(frame);
                    self.phase = MorphPhase::PendingTransition;
                    debug!("fresh frame queued at progress {:.4}", self.morph_progress);
                }
                // A pending frame while morphing is unreachable; drop the enqueue
            }
            MorphPhase::PendingTransition | MorphPhase::Transitioning => {
                // Last write wins
                self.pending_frame = Some(frame);
            }
        }

        Ok(())
    }

    /// Advance the scheduler by `delta_ms` of render-loop time
    pub fn tick(&mut self, delta_ms: f64) {
        self.now_ms += delta_ms.max(0.0);

        match self.phase {
            MorphPhase::Idle => {}
            MorphPhase::Morphing => {
                self.advance_progress();
                if self.morph_progress >= 1.0 {
                    self.complete_cycle();
                }
            }
            MorphPhase::PendingTransition => {
                self.advance_progress();
                if self.near_boundary() && self.pending_frame.is_some() {
                    self.transition_start_ms = Some(self.now_ms);
                    self.phase = MorphPhase::Transitioning;
                    debug!("transition started at progress {:.4}", self.morph_progress);
                } else if self.morph_progress >= 1.0 && self.pending_frame.is_none() {
                    self.complete_cycle();
                }
            }
            MorphPhase::Transitioning => {
                self.advance_progress();
                match (self.transition_start_ms, self.pending_frame.is_some()) {
                    (Some(start), true) => {
                        if self.now_ms - start >= self.config.transition_duration_ms {
                            self.complete_transition();
                        }
                    }
                    _ => {
                        // Should be unreachable; a glitch beats an error here
                        warn!("transitioning without pending frame or start time; recovering");
                        self.transition_start_ms = None;
                        self.phase = MorphPhase::Morphing;
                    }
                }
            }
        }
    }

    /// Active frame pair and blend progress for the renderer
    ///
    /// Absent until two frames have been accepted. During a transition the
    /// frame being replaced is substituted with the incoming frame, and
    /// the reported progress is eased toward the 0.5 midpoint so the
    /// visual interpolation parameter never jumps.
    pub fn active_frames(&self) -> Option<ActiveFrames<'_>> {
        let (frame_a, frame_b) = match (&self.frame_a, &self.frame_b) {
            (Some(a), Some(b)) => (a, b),
            _ => return None,
        };

        if self.phase == MorphPhase::Transitioning {
            if let (Some(pending), Some(start)) = (&self.pending_frame, self.transition_start_ms) {
                let elapsed =
                    ((self.now_ms - start) / self.config.transition_duration_ms).clamp(0.0, 1.0);
                let progress =
                    self.morph_progress + (0.5 - self.morph_progress) * smoothstep(elapsed);
                let (a, b) = if self.morph_progress >= 0.5 {
                    (pending, frame_b)
                } else {
                    (frame_a, pending)
                };
                return Some(ActiveFrames {
                    frame_a: a,
                    frame_b: b,
                    progress,
                    is_transitioning: true,
                });
            }
        }

        Some(ActiveFrames {
            frame_a,
            frame_b,
            progress: self.morph_progress,
            is_transitioning: false,
        })
    }

    /// Whether the morph clock currently sits inside the boundary window
    ///
    /// Only meaningful while morphing; a queued or blending frame reports
    /// `false`.
    pub fn is_at_phase_boundary(&self) -> bool {
        self.phase == MorphPhase::Morphing && self.near_boundary()
    }

    /// Current scheduler phase
    pub fn state(&self) -> MorphPhase {
        self.phase
    }

    /// Number of completed morph cycles
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Raw morph clock progress in `[0, 1]`
    pub fn morph_progress(&self) -> f64 {
        self.morph_progress
    }

    /// Return to idle, dropping all content
    ///
    /// Used when the audio source changes and continuity must not be
    /// assumed. Idempotent and immediate.
    pub fn reset(&mut self) {
        self.phase = MorphPhase::Idle;
        self.frame_a = None;
        self.frame_b = None;
        self.pending_frame = None;
        self.phase_start_ms = self.now_ms;
        self.morph_progress = 0.0;
        self.cycle_count = 0;
        self.transition_start_ms = None;
        debug!("scheduler reset");
    }

    fn advance_progress(&mut self) {
        self.morph_progress =
            ((self.now_ms - self.phase_start_ms) / self.config.phase_duration_ms).min(1.0);
    }

    fn near_boundary(&self) -> bool {
        let tolerance = self.config.boundary_tolerance_ms / self.config.phase_duration_ms;
        self.morph_progress <= tolerance || self.morph_progress >= 1.0 - tolerance
    }

    /// Phase boundary reached with nothing queued: swap the pair
    fn complete_cycle(&mut self) {
        std::mem::swap(&mut self.frame_a, &mut self.frame_b);
        self.phase_start_ms = self.now_ms;
        self.morph_progress = 0.0;
        self.cycle_count += 1;
        self.phase = MorphPhase::Morphing;
        debug!("cycle {} complete", self.cycle_count);
    }

    /// Transition blend finished: merge the incoming frame into the pair
    fn complete_transition(&mut self) {
        if let Some(fresh) = self.pending_frame.take() {
            if self.morph_progress < 0.5 {
                self.frame_b = Some(fresh);
            } else {
                self.frame_a = Some(fresh);
            }
        }
        self.transition_start_ms = None;
        self.phase_start_ms = self.now_ms;
        self.morph_progress = 0.0;
        self.phase = MorphPhase::Morphing;
        debug!("transition complete");
    }
}

impl Default for MorphScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Smoothstep ease `t²(3 − 2t)`
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame(tag: &str) -> ContentFrame {
        ContentFrame::new(vec![0.5; DEFAULT_DNA_LEN], format!("asset://{tag}")).unwrap()
    }

    fn running_scheduler() -> MorphScheduler {
        let mut scheduler = MorphScheduler::default();
        scheduler.enqueue_fresh_frame(frame("a")).unwrap();
        scheduler.enqueue_fresh_frame(frame("b")).unwrap();
        scheduler
    }

    #[test]
    fn test_rejects_wrong_dna_length() {
        let mut scheduler = MorphScheduler::default();
        let bad = ContentFrame::new(vec![0.5; 3], "asset://bad").unwrap();
        assert!(matches!(
            scheduler.enqueue_fresh_frame(bad),
            Err(CoreError::InvalidFrame(_))
        ));
        assert_eq!(scheduler.state(), MorphPhase::Idle);
    }

    #[test]
    fn test_idle_until_two_frames() {
        let mut scheduler = MorphScheduler::default();
        assert!(scheduler.active_frames().is_none());

        scheduler.enqueue_fresh_frame(frame("x")).unwrap();
        assert_eq!(scheduler.state(), MorphPhase::Idle);
        assert!(scheduler.active_frames().is_none());

        scheduler.enqueue_fresh_frame(frame("y")).unwrap();
        assert_eq!(scheduler.state(), MorphPhase::Morphing);

        let active = scheduler.active_frames().unwrap();
        assert_eq!(active.frame_a.asset, "asset://x");
        assert_eq!(active.frame_b.asset, "asset://y");
        assert_eq!(active.progress, 0.0);
        assert!(!active.is_transitioning);
    }

    #[test]
    fn test_tick_is_noop_while_idle() {
        let mut scheduler = MorphScheduler::default();
        scheduler.tick(5_000.0);
        assert_eq!(scheduler.state(), MorphPhase::Idle);
        assert_eq!(scheduler.cycle_count(), 0);
    }

    #[test]
    fn test_cycle_completion_swaps_and_counts() {
        let mut scheduler = running_scheduler();

        scheduler.tick(60_000.0);
        assert_eq!(scheduler.state(), MorphPhase::Morphing);
        assert_eq!(scheduler.cycle_count(), 1);

        let active = scheduler.active_frames().unwrap();
        assert_eq!(active.frame_a.asset, "asset://b");
        assert_eq!(active.frame_b.asset, "asset://a");
        assert_eq!(active.progress, 0.0);
    }

    #[test]
    fn test_enqueue_mid_phase_waits_for_boundary() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0); // progress 0.5, not near a boundary
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();
        assert_eq!(scheduler.state(), MorphPhase::PendingTransition);

        scheduler.tick(1_000.0);
        assert_eq!(scheduler.state(), MorphPhase::PendingTransition);
        assert!(!scheduler.active_frames().unwrap().is_transitioning);
        assert!(!scheduler.is_at_phase_boundary());
    }

    #[test]
    fn test_pending_last_write_wins() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0);
        scheduler.enqueue_fresh_frame(frame("first")).unwrap();
        scheduler.enqueue_fresh_frame(frame("second")).unwrap();
        assert_eq!(scheduler.state(), MorphPhase::PendingTransition);

        // Reach the boundary and let the transition run to completion
        scheduler.tick(29_950.0);
        assert_eq!(scheduler.state(), MorphPhase::Transitioning);
        scheduler.tick(1_500.0);
        assert_eq!(scheduler.state(), MorphPhase::Morphing);

        // Progress was >= 0.5 at the boundary, so the fresh frame replaced
        // frame A; only the second enqueue was integrated.
        let active = scheduler.active_frames().unwrap();
        assert_eq!(active.frame_a.asset, "asset://second");
    }

    #[test]
    fn test_transition_fires_at_boundary() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0);
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();

        // 59.95 s: inside the 100 ms boundary window
        scheduler.tick(29_950.0);
        assert_eq!(scheduler.state(), MorphPhase::Transitioning);

        let active = scheduler.active_frames().unwrap();
        assert!(active.is_transitioning);
        // The replaced half is substituted with the incoming frame
        assert_eq!(active.frame_a.asset, "asset://z");
        assert_eq!(active.frame_b.asset, "asset://b");
    }

    #[test]
    fn test_transition_progress_eases_toward_midpoint() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0);
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();
        scheduler.tick(29_950.0);

        let start_progress = scheduler.active_frames().unwrap().progress;

        // Halfway through the 1500 ms blend the smoothstep midpoint puts
        // the reported progress halfway between the raw clock and 0.5.
        scheduler.tick(750.0);
        let mid = scheduler.active_frames().unwrap();
        assert!(mid.is_transitioning);
        assert!(mid.progress < start_progress);
        assert!(mid.progress > 0.5);

        scheduler.tick(740.0);
        let near_end = scheduler.active_frames().unwrap();
        assert!((near_end.progress - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_transition_completion_restores_morphing() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0);
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();
        scheduler.tick(29_950.0);
        let cycles_before = scheduler.cycle_count();

        scheduler.tick(1_500.0);

        assert_eq!(scheduler.state(), MorphPhase::Morphing);
        // A transition does not count as a completed cycle
        assert_eq!(scheduler.cycle_count(), cycles_before);

        let active = scheduler.active_frames().unwrap();
        assert!(!active.is_transitioning);
        assert_eq!(active.frame_a.asset, "asset://z");
        assert_eq!(active.progress, 0.0);
    }

    #[test]
    fn test_enqueue_during_transition_is_kept_for_next_cycle() {
        let mut scheduler = running_scheduler();

        scheduler.tick(30_000.0);
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();
        scheduler.tick(29_950.0);
        assert_eq!(scheduler.state(), MorphPhase::Transitioning);

        // The transition timer keeps running after a mid-blend enqueue
        scheduler.enqueue_fresh_frame(frame("late")).unwrap();
        scheduler.tick(1_500.0);

        assert_eq!(scheduler.state(), MorphPhase::Morphing);
        let active = scheduler.active_frames().unwrap();
        assert_eq!(active.frame_a.asset, "asset://late");
    }

    #[test]
    fn test_boundary_window_reported_only_while_morphing() {
        let mut scheduler = running_scheduler();
        assert!(scheduler.is_at_phase_boundary());

        scheduler.tick(30_000.0);
        assert!(!scheduler.is_at_phase_boundary());

        scheduler.tick(29_950.0);
        assert!(scheduler.is_at_phase_boundary());

        scheduler.enqueue_fresh_frame(frame("z")).unwrap();
        assert_eq!(scheduler.state(), MorphPhase::PendingTransition);
        assert!(!scheduler.is_at_phase_boundary());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut scheduler = running_scheduler();
        scheduler.tick(45_000.0);
        scheduler.enqueue_fresh_frame(frame("z")).unwrap();

        scheduler.reset();
        assert_eq!(scheduler.state(), MorphPhase::Idle);
        assert!(scheduler.active_frames().is_none());
        assert_eq!(scheduler.cycle_count(), 0);

        // Idempotent
        scheduler.reset();
        assert_eq!(scheduler.state(), MorphPhase::Idle);
    }

    #[test]
    fn test_smoothstep_shape() {
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(1.0), 1.0);
        assert!((smoothstep(0.5) - 0.5).abs() < 1e-12);
        assert!(smoothstep(0.25) < 0.25);
        assert!(smoothstep(0.75) > 0.75);
    }

    proptest! {
        #[test]
        fn prop_cycle_count_never_decreases(
            deltas in proptest::collection::vec(0.0f64..20_000.0, 1..200),
        ) {
            let mut scheduler = running_scheduler();
            let mut last = scheduler.cycle_count();
            for delta in deltas {
                scheduler.tick(delta);
                prop_assert!(scheduler.cycle_count() >= last);
                last = scheduler.cycle_count();
            }
        }

        #[test]
        fn prop_reported_progress_stays_in_unit_range(
            deltas in proptest::collection::vec(0.0f64..20_000.0, 1..200),
            enqueue_at in 0usize..200,
        ) {
            let mut scheduler = running_scheduler();
            for (i, delta) in deltas.iter().enumerate() {
                if i == enqueue_at {
                    scheduler.enqueue_fresh_frame(frame("fresh")).unwrap();
                }
                scheduler.tick(*delta);
                if let Some(active) = scheduler.active_frames() {
                    prop_assert!((0.0..=1.0).contains(&active.progress));
                }
            }
        }
    }
}
