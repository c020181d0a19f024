use super::SignalFilter;

/// Single-pole low-pass: `output += gain * (input - output)`.
///
/// The output starts at zero, so the first sample produces a step transient.
#[derive(Debug, Clone)]
pub struct ExponentialFilter {
    gain: f32,
    output: f32,
}

impl ExponentialFilter {
    pub fn new(gain: f32) -> Self {
        Self { gain, output: 0.0 }
    }

    /// Gain actually applied, always within `[0, 1]`.
    pub fn effective_gain(&self) -> f32 {
        if self.gain.is_nan() {
            return 0.0;
        }
        self.gain.clamp(0.0, 1.0)
    }
}

impl SignalFilter for ExponentialFilter {
    fn update(&mut self, sample: f32) -> f32 {
        self.output += self.effective_gain() * (sample - self.output);
        self.output
    }

    fn output(&self) -> f32 {
        self.output
    }

    fn reset(&mut self) {
        self.output = 0.0;
    }
}
