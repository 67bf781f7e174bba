//! Tempo estimation from inter-onset intervals.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Configuration for [`TempoEstimator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoConfig {
    /// Retention window for onset timestamps in milliseconds
    pub window_ms: f64,
    /// Lowest tempo candidate in BPM (inclusive)
    pub min_bpm: u32,
    /// Highest tempo candidate in BPM (inclusive)
    pub max_bpm: u32,
    /// Maximum relative deviation of an interval from a beat multiple
    pub ioi_tolerance: f64,
    /// Largest beat multiple an interval may be matched against
    pub max_multiple: u32,
    /// Weight of the newest candidate in the running estimate
    pub smoothing: f32,
    /// Minimum onsets in the window before estimating
    pub min_onsets: usize,
    /// Tempo reported before any estimate has been made
    pub initial_bpm: f32,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window_ms: 90_000.0,
            min_bpm: 60,
            max_bpm: 180,
            ioi_tolerance: 0.05,
            max_multiple: 4,
            smoothing: 0.1,
            min_onsets: 4,
            initial_bpm: 120.0,
        }
    }
}

/// Sliding-window tempo estimator
///
/// Maintains 90 seconds of onset timestamps and scores every integer tempo
/// candidate against the inter-onset intervals. Intervals may match a
/// candidate's beat period at multiples 1-4; the weight decays with the
/// multiple so the fundamental beats its harmonics and subharmonics.
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    config: TempoConfig,
    onsets: VecDeque<f64>,
    tempo_bpm: f32,
    confidence: f32,
}

impl TempoEstimator {
    /// Create an estimator with the given configuration
    pub fn new(config: TempoConfig) -> Self {
        let tempo_bpm = config.initial_bpm;
        Self {
            config,
            onsets: VecDeque::new(),
            tempo_bpm,
            confidence: 0.0,
        }
    }

    /// Prune onsets that fell out of the retention window
    ///
    /// Call once per analysis tick.
    pub fn tick(&mut self, now_ms: f64) {
        let horizon = now_ms - self.config.window_ms;
        while self.onsets.front().is_some_and(|&t| t < horizon) {
            self.onsets.pop_front();
        }
    }

    /// Record a new onset and refresh the tempo estimate
    ///
    /// With fewer than `min_onsets` timestamps in the window the estimate
    /// is left unchanged (a soft no-op, not an error).
    pub fn record_onset(&mut self, timestamp_ms: f64) {
        self.onsets.push_back(timestamp_ms);
        self.tick(timestamp_ms);

        if self.onsets.len() < self.config.min_onsets {
            return;
        }

        if let Some((bpm, score)) = self.best_candidate() {
            let k = self.config.smoothing;
            self.tempo_bpm = k * bpm + (1.0 - k) * self.tempo_bpm;
            self.confidence = score.min(1.0);
            trace!(
                "tempo estimate {:.1} BPM from candidate {:.0} (confidence {:.2})",
                self.tempo_bpm,
                bpm,
                self.confidence
            );
        }
    }

    /// Score every candidate tempo and return the best `(bpm, score)`
    fn best_candidate(&self) -> Option<(f32, f32)> {
        let iois: Vec<f64> = self
            .onsets
            .iter()
            .zip(self.onsets.iter().skip(1))
            .map(|(a, b)| (b - a) / 1000.0)
            .collect();

        if iois.is_empty() {
            return None;
        }

        let mut best: Option<(f32, f32)> = None;

        for bpm in self.config.min_bpm..=self.config.max_bpm {
            let period = 60.0 / bpm as f64;
            let mut sum = 0.0;
            let mut accepted = 0usize;

            for &ioi in &iois {
                let ratio = ioi / period;
                let multiple = ratio.round();
                if multiple < 1.0 || multiple > self.config.max_multiple as f64 {
                    continue;
                }
                let error = (ratio - multiple).abs();
                if error < self.config.ioi_tolerance {
                    sum += (1.0 - error) / multiple;
                    accepted += 1;
                }
            }

            if accepted > 0 {
                let score = (sum / accepted as f64) as f32;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((bpm as f32, score));
                }
            }
        }

        best
    }

    /// Current tempo estimate in BPM
    pub fn tempo_bpm(&self) -> f32 {
        self.tempo_bpm
    }

    /// Confidence of the current estimate in `[0, 1]`
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Number of onsets currently retained
    pub fn onset_count(&self) -> usize {
        self.onsets.len()
    }

    /// Clear all state for a source change
    pub fn reset(&mut self) {
        self.onsets.clear();
        self.tempo_bpm = self.config.initial_bpm;
        self.confidence = 0.0;
    }
}
