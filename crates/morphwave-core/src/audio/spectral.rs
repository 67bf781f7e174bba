//! Spectral analysis front-end.
//!
//! Turns raw mono sample chunks into fixed-rate analysis frames: a Hann
//! windowed forward FFT runs once per hop and yields the time-domain
//! window alongside its linear magnitude spectrum. Hosts that already run
//! their own analyser can skip this and feed
//! [`crate::AudioClockEstimator`] directly.

use crate::audio::features::SPECTRAL_BANDS;
use crate::{CoreError, Result};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Configuration for [`SpectralAnalyzer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectralConfig {
    /// Sample rate of the incoming audio in Hz
    pub sample_rate: u32,
    /// FFT size in samples (power of two)
    pub fft_size: usize,
    /// Analysis frames emitted per second
    pub tick_rate_hz: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fft_size: 2048,
            tick_rate_hz: 10.0,
        }
    }
}

/// One analysis tick: the estimator's input contract
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    /// Timestamp of the frame in milliseconds of processed audio
    pub timestamp_ms: f64,
    /// Time-domain window, oldest sample first
    pub samples: Vec<f32>,
    /// Linear magnitude spectrum (first `fft_size / 2` bins)
    pub magnitudes: Vec<f32>,
}

/// Fixed-rate FFT front-end over a sample ring buffer
pub struct SpectralAnalyzer {
    config: SpectralConfig,
    fft: Arc<dyn Fft<f32>>,
    input_buffer: Vec<f32>,
    buffer_write_pos: usize,
    samples_since_fft: usize,
    hop_size: usize,
    fft_buffer: Vec<Complex<f32>>,
    scratch_buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    total_samples: u64,
}

impl SpectralAnalyzer {
    /// Create an analyzer, validating the buffer geometry
    ///
    /// Invalid geometry is fatal: the front-end refuses to start rather
    /// than silently degrade.
    pub fn new(config: SpectralConfig) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(CoreError::InvalidConfig("sample rate must be non-zero".into()));
        }
        if !config.fft_size.is_power_of_two() {
            return Err(CoreError::InvalidConfig(format!(
                "FFT size {} is not a power of two",
                config.fft_size
            )));
        }
        if config.fft_size / 2 < SPECTRAL_BANDS {
            return Err(CoreError::InvalidConfig(format!(
                "FFT size {} yields fewer than {} spectrum bins",
                config.fft_size, SPECTRAL_BANDS
            )));
        }
        if config.tick_rate_hz <= 0.0 {
            return Err(CoreError::InvalidConfig("tick rate must be positive".into()));
        }

        let fft_size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        let hop_size = ((config.sample_rate as f32 / config.tick_rate_hz) as usize).max(1);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let t = i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * t).cos())
            })
            .collect();

        debug!(
            "SpectralAnalyzer created: sample_rate={}, fft_size={}, hop_size={}",
            config.sample_rate, fft_size, hop_size
        );

        Ok(Self {
            config,
            fft,
            input_buffer: vec![0.0; fft_size],
            buffer_write_pos: 0,
            samples_since_fft: 0,
            hop_size,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            window,
            total_samples: 0,
        })
    }

    /// Feed a chunk of mono samples, returning any frames that completed
    ///
    /// NaN and infinite samples are treated as silence; malformed content
    /// is never an error.
    pub fn process_samples(&mut self, samples: &[f32]) -> Vec<AnalysisFrame> {
        let mut frames = Vec::new();

        for &raw in samples {
            let sample = if raw.is_finite() { raw } else { 0.0 };
            self.input_buffer[self.buffer_write_pos] = sample;
            self.buffer_write_pos = (self.buffer_write_pos + 1) % self.config.fft_size;
            self.total_samples += 1;
            self.samples_since_fft += 1;

            if self.samples_since_fft >= self.hop_size
                && self.total_samples >= self.config.fft_size as u64
            {
                frames.push(self.emit_frame());
                self.samples_since_fft = 0;
            }
        }

        frames
    }

    /// Run the FFT over the current window and package a frame
    fn emit_frame(&mut self) -> AnalysisFrame {
        let fft_size = self.config.fft_size;
        let mut time_window = vec![0.0f32; fft_size];

        // Unwrap the ring buffer; the write position is the oldest sample
        for (i, slot) in time_window.iter_mut().enumerate() {
            let src_idx = (self.buffer_write_pos + i) % fft_size;
            *slot = self.input_buffer[src_idx];
        }

        for i in 0..fft_size {
            self.fft_buffer[i] = Complex::new(time_window[i] * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        let norm_factor = 1.0 / (fft_size as f32).sqrt();
        let magnitudes: Vec<f32> = self.fft_buffer[..fft_size / 2]
            .iter()
            .map(|c| c.norm() * norm_factor)
            .collect();

        let timestamp_ms = self.total_samples as f64 / self.config.sample_rate as f64 * 1000.0;

        AnalysisFrame {
            timestamp_ms,
            samples: time_window,
            magnitudes,
        }
    }

    /// Length of the magnitude spectrum in emitted frames
    pub fn spectrum_size(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Length of the time-domain window in emitted frames
    pub fn frame_size(&self) -> usize {
        self.config.fft_size
    }

    /// Samples between emitted frames
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Sample rate the analyzer was created with
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Clear the ring buffer and counters for a source change
    pub fn reset(&mut self) {
        self.input_buffer.fill(0.0);
        self.buffer_write_pos = 0;
        self.samples_since_fft = 0;
        self.total_samples = 0;
    }
}
