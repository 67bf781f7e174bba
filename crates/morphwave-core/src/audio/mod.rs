//! Audio clock estimation.
//!
//! The estimator consumes fixed-rate analysis ticks (a time-domain window
//! plus a linear magnitude spectrum) and produces one [`features::AudioFeatures`]
//! and one [`features::ClockState`] per tick. The [`spectral`] front-end can
//! produce those ticks from raw sample chunks for hosts that do not run
//! their own analyser.

pub mod estimator;
pub mod features;
pub mod onset;
pub mod phase;
pub mod smoothing;
pub mod spectral;
pub mod tempo;
