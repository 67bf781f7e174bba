//! MorphWave Core - Audio Clock Estimation and Morph Scheduling
//!
//! This crate contains the real-time core for MorphWave, including:
//! - Spectral analysis front-end (fixed-rate FFT frames from raw audio)
//! - Audio clock estimation (onset detection, tempo, beat/bar phase)
//! - Morph scheduling (boundary-gated integration of fresh content)
//!
//! Audio capture, the pixel-level renderer, and the content generation
//! backends are external collaborators. This core only decides *when*
//! content may be swapped and *what the current beat/tempo estimate is*.

#![warn(missing_docs)]

use thiserror::Error;

pub mod audio;
pub mod morph;

// --- Re-exports grouped by category ---

// Audio clock
pub use audio::estimator::{AudioClockEstimator, EstimatorConfig, SmoothedLevels};
pub use audio::features::{AudioFeatures, ClockState, SPECTRAL_BANDS};
pub use audio::onset::{OnsetConfig, OnsetDetector, OnsetFrame};
pub use audio::phase::PhaseTracker;
pub use audio::smoothing::{DualEma, Ema};
pub use audio::spectral::{AnalysisFrame, SpectralAnalyzer, SpectralConfig};
pub use audio::tempo::{TempoConfig, TempoEstimator};

// Morph scheduling
pub use morph::frame::ContentFrame;
pub use morph::scheduler::{ActiveFrames, MorphPhase, MorphScheduler, SchedulerConfig};

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// An analysis buffer does not match the geometry declared at setup
    #[error("Invalid analysis buffer: {0}")]
    InvalidBuffer(String),

    /// A content frame failed validation at the ingestion boundary
    #[error("Invalid content frame: {0}")]
    InvalidFrame(String),

    /// Component configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
