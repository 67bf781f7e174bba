//! Exponential moving average conditioning for downstream mappers.

/// Single-pole exponential moving average
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    value: f32,
}

impl Ema {
    /// Create a filter with the given update weight
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: 0.0 }
    }

    /// Fold a sample into the average and return the new value
    pub fn update(&mut self, sample: f32) -> f32 {
        self.value += self.alpha * (sample - self.value);
        self.value
    }

    /// Current filter output
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Return the filter output to zero
    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Paired fast/slow filters over one signal
///
/// The fast filter (~120 ms time constant at the default tick rate) tracks
/// transients; the slow one (~2-3 s) tracks the level envelope.
#[derive(Debug, Clone, Copy)]
pub struct DualEma {
    /// Transient-tracking filter
    pub fast: Ema,
    /// Envelope-tracking filter
    pub slow: Ema,
}

impl DualEma {
    /// Create a pair from the two update weights
    pub fn new(fast_alpha: f32, slow_alpha: f32) -> Self {
        Self {
            fast: Ema::new(fast_alpha),
            slow: Ema::new(slow_alpha),
        }
    }

    /// Fold a sample into both filters
    pub fn update(&mut self, sample: f32) {
        self.fast.update(sample);
        self.slow.update(sample);
    }

    /// Reset both filters
    pub fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
    }
}
