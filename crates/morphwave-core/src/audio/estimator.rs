//! Audio clock estimator.
//!
//! Composes onset detection, tempo estimation and phase tracking over a
//! fixed-rate analysis tick, producing one [`AudioFeatures`] and one
//! [`ClockState`] per tick. Results are cached for polling and also
//! pushed on a bounded channel for hosts that prefer a receive loop.

use crate::audio::features::{
    AudioFeatures, ClockState, BASS_RANGE_HZ, HIGHS_RANGE_HZ, MIDS_RANGE_HZ, SPECTRAL_BANDS,
};
use crate::audio::onset::{OnsetConfig, OnsetDetector};
use crate::audio::phase::PhaseTracker;
use crate::audio::smoothing::DualEma;
use crate::audio::tempo::{TempoConfig, TempoEstimator};
use crate::{CoreError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for [`AudioClockEstimator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Sample rate of the analysed audio in Hz
    pub sample_rate: u32,
    /// Length of the time-domain buffer supplied each tick
    pub frame_size: usize,
    /// Length of the magnitude buffer supplied each tick
    pub spectrum_size: usize,
    /// Onset detector settings
    pub onset: OnsetConfig,
    /// Tempo estimator settings
    pub tempo: TempoConfig,
    /// Update weight of the fast conditioning filters (~120 ms)
    pub fast_alpha: f32,
    /// Update weight of the slow conditioning filters (~2-3 s)
    pub slow_alpha: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frame_size: 2048,
            spectrum_size: 1024,
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            fast_alpha: 0.3,
            slow_alpha: 0.05,
        }
    }
}

/// Fast/slow conditioned levels for downstream parameter mappers
///
/// Auxiliary outputs; they gate no state transition inside the estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothedLevels {
    /// Fast-filtered RMS
    pub rms_fast: f32,
    /// Slow-filtered RMS
    pub rms_slow: f32,
    /// Fast-filtered bass level
    pub bass_fast: f32,
    /// Slow-filtered bass level
    pub bass_slow: f32,
    /// Fast-filtered mids level
    pub mids_fast: f32,
    /// Slow-filtered mids level
    pub mids_slow: f32,
    /// Fast-filtered highs level
    pub highs_fast: f32,
    /// Slow-filtered highs level
    pub highs_slow: f32,
}

/// Estimates tempo and beat/bar phase from periodic analysis ticks
pub struct AudioClockEstimator {
    config: EstimatorConfig,
    onset: OnsetDetector,
    tempo: TempoEstimator,
    phase: PhaseTracker,
    rms_ema: DualEma,
    bass_ema: DualEma,
    mids_ema: DualEma,
    highs_ema: DualEma,
    previous_timestamp_ms: Option<f64>,
    latest_features: AudioFeatures,
    latest_clock: ClockState,
    sender: Sender<(AudioFeatures, ClockState)>,
    receiver: Receiver<(AudioFeatures, ClockState)>,
}

impl AudioClockEstimator {
    /// Create an estimator, validating the buffer geometry
    ///
    /// Structurally invalid geometry is fatal: the estimator refuses to
    /// start rather than silently degrade.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(CoreError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if config.frame_size == 0 {
            return Err(CoreError::InvalidConfig("frame size must be non-zero".into()));
        }
        if config.spectrum_size < SPECTRAL_BANDS {
            return Err(CoreError::InvalidConfig(format!(
                "spectrum size {} is below the band resolution {}",
                config.spectrum_size, SPECTRAL_BANDS
            )));
        }

        let (sender, receiver) = bounded(16);

        debug!(
            "AudioClockEstimator created: sample_rate={}, frame_size={}, spectrum_size={}",
            config.sample_rate, config.frame_size, config.spectrum_size
        );

        Ok(Self {
            onset: OnsetDetector::new(config.onset.clone()),
            tempo: TempoEstimator::new(config.tempo.clone()),
            phase: PhaseTracker::new(),
            rms_ema: DualEma::new(config.fast_alpha, config.slow_alpha),
            bass_ema: DualEma::new(config.fast_alpha, config.slow_alpha),
            mids_ema: DualEma::new(config.fast_alpha, config.slow_alpha),
            highs_ema: DualEma::new(config.fast_alpha, config.slow_alpha),
            previous_timestamp_ms: None,
            latest_features: AudioFeatures::default(),
            latest_clock: ClockState::default(),
            sender,
            receiver,
            config,
        })
    }

    /// Process one analysis tick
    ///
    /// Buffer lengths must match the geometry declared at setup; a
    /// mismatch is an error. Malformed content (NaN/Inf) is treated as
    /// silence, never an error. Never blocks.
    pub fn process_frame(
        &mut self,
        timestamp_ms: f64,
        samples: &[f32],
        magnitudes: &[f32],
    ) -> Result<(AudioFeatures, ClockState)> {
        if samples.len() != self.config.frame_size {
            return Err(CoreError::InvalidBuffer(format!(
                "time-domain buffer length {} (expected {})",
                samples.len(),
                self.config.frame_size
            )));
        }
        if magnitudes.len() != self.config.spectrum_size {
            return Err(CoreError::InvalidBuffer(format!(
                "magnitude buffer length {} (expected {})",
                magnitudes.len(),
                self.config.spectrum_size
            )));
        }

        let samples: Vec<f32> = samples
            .iter()
            .map(|&s| if s.is_finite() { s } else { 0.0 })
            .collect();
        let magnitudes: Vec<f32> = magnitudes
            .iter()
            .map(|&m| if m.is_finite() { m.max(0.0) } else { 0.0 })
            .collect();

        let dt_ms = self
            .previous_timestamp_ms
            .map(|prev| (timestamp_ms - prev).max(0.0))
            .unwrap_or(0.0);
        self.previous_timestamp_ms = Some(timestamp_ms);

        let onset = self.onset.process(timestamp_ms, &magnitudes);
        self.tempo.tick(timestamp_ms);
        if onset.is_onset {
            self.tempo.record_onset(timestamp_ms);
            debug!(
                "onset at {:.0} ms (flux {:.4}, tempo {:.1} BPM)",
                timestamp_ms,
                onset.flux,
                self.tempo.tempo_bpm()
            );
        }

        self.phase.advance(dt_ms, self.tempo.tempo_bpm());
        if onset.is_onset {
            self.phase.correct(self.tempo.confidence());
        }

        let rms = Self::rms(&samples);
        let spectral_bands = Self::band_spectrum(&magnitudes);
        let centroid_hz = self.centroid_hz(&magnitudes);
        let (bass, mids, highs) = self.level_split(&magnitudes);

        self.rms_ema.update(rms);
        self.bass_ema.update(bass);
        self.mids_ema.update(mids);
        self.highs_ema.update(highs);

        let features = AudioFeatures {
            timestamp_ms,
            bpm: self.tempo.tempo_bpm(),
            beat_phase: self.phase.beat_phase(),
            rms,
            spectral_bands,
            centroid_hz,
            energy: onset.energy,
            bass,
            mids,
            highs,
        };
        let clock = ClockState {
            tempo_bpm: self.tempo.tempo_bpm(),
            beat_phase: self.phase.beat_phase(),
            bar_phase: self.phase.bar_phase(),
            current_bar: self.phase.current_bar(),
            confidence: self.tempo.confidence(),
            timestamp_ms,
        };

        self.latest_features = features.clone();
        self.latest_clock = clock;
        let _ = self.sender.try_send((features.clone(), clock));

        Ok((features, clock))
    }

    /// Root mean square of a sample window
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / samples.len() as f32).sqrt()
    }

    /// Reduce the magnitude spectrum to [`SPECTRAL_BANDS`] bands
    fn band_spectrum(magnitudes: &[f32]) -> [f32; SPECTRAL_BANDS] {
        let mut bands = [0.0f32; SPECTRAL_BANDS];
        let len = magnitudes.len();

        for (i, band) in bands.iter_mut().enumerate() {
            let start = i * len / SPECTRAL_BANDS;
            let end = (((i + 1) * len) / SPECTRAL_BANDS).max(start + 1);
            let slice = &magnitudes[start..end];
            *band = slice.iter().sum::<f32>() / slice.len() as f32;
        }

        bands
    }

    /// Spectral centroid in Hz
    fn centroid_hz(&self, magnitudes: &[f32]) -> f32 {
        let bin_width = self.bin_width_hz();
        let total: f32 = magnitudes.iter().sum();
        if total <= f32::EPSILON {
            return 0.0;
        }
        let weighted: f32 = magnitudes
            .iter()
            .enumerate()
            .map(|(i, m)| i as f32 * bin_width * m)
            .sum();
        weighted / total
    }

    /// Mean magnitudes over the bass/mids/highs frequency ranges
    fn level_split(&self, magnitudes: &[f32]) -> (f32, f32, f32) {
        (
            self.range_level(magnitudes, BASS_RANGE_HZ),
            self.range_level(magnitudes, MIDS_RANGE_HZ),
            self.range_level(magnitudes, HIGHS_RANGE_HZ),
        )
    }

    fn range_level(&self, magnitudes: &[f32], (min_hz, max_hz): (f32, f32)) -> f32 {
        let bin_width = self.bin_width_hz();
        let min_bin = (min_hz / bin_width) as usize;
        let max_bin = ((max_hz / bin_width) as usize).min(magnitudes.len().saturating_sub(1));
        if max_bin <= min_bin || min_bin >= magnitudes.len() {
            return 0.0;
        }
        let slice = &magnitudes[min_bin..=max_bin];
        slice.iter().sum::<f32>() / slice.len() as f32
    }

    fn bin_width_hz(&self) -> f32 {
        (self.config.sample_rate as f32 / 2.0) / self.config.spectrum_size as f32
    }

    /// Latest features produced by `process_frame`
    pub fn latest_features(&self) -> &AudioFeatures {
        &self.latest_features
    }

    /// Latest clock state produced by `process_frame`
    pub fn latest_clock(&self) -> ClockState {
        self.latest_clock
    }

    /// Conditioned fast/slow levels for downstream mappers
    pub fn smoothed(&self) -> SmoothedLevels {
        SmoothedLevels {
            rms_fast: self.rms_ema.fast.value(),
            rms_slow: self.rms_ema.slow.value(),
            bass_fast: self.bass_ema.fast.value(),
            bass_slow: self.bass_ema.slow.value(),
            mids_fast: self.mids_ema.fast.value(),
            mids_slow: self.mids_ema.slow.value(),
            highs_fast: self.highs_ema.fast.value(),
            highs_slow: self.highs_ema.slow.value(),
        }
    }

    /// Try to receive a result from the delivery channel
    pub fn try_receive(&self) -> Option<(AudioFeatures, ClockState)> {
        self.receiver.try_recv().ok()
    }

    /// Sample rate the estimator was created with
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Clear all internal state for a source change
    pub fn reset(&mut self) {
        self.onset.reset();
        self.tempo.reset();
        self.phase.reset();
        self.rms_ema.reset();
        self.bass_ema.reset();
        self.mids_ema.reset();
        self.highs_ema.reset();
        self.previous_timestamp_ms = None;
        self.latest_features = AudioFeatures::default();
        self.latest_clock = ClockState::default();

        debug!("AudioClockEstimator reset");
    }
}
