// filters/low_pass.rs
use super::ScalarEstimator;

/// First order low-pass: `estimate = estimate * bias + sample * (1 - bias)`.
///
/// `bias` trades latency for noise rejection; 0 passes samples through
/// unchanged, values close to 1 smooth heavily.
#[derive(Clone, Debug)]
pub struct LowPassFilter {
    bias: f64,
    current: f64,
}

impl LowPassFilter {
    /// `bias` is clamped into [0, 1).
    pub fn new(bias: f64, seed: f64) -> Self {
        let bias = if bias.is_finite() {
            bias.clamp(0.0, 0.999)
        } else {
            0.0
        };
        Self {
            bias,
            current: seed,
        }
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl ScalarEstimator for LowPassFilter {
    fn step(&mut self, measurement: f64) -> f64 {
        self.current = self.current * self.bias + measurement * (1.0 - self.bias);
        self.current
    }

    fn reset(&mut self, seed: f64) {
        self.current = seed;
    }

    fn estimate(&self) -> f64 {
        self.current
    }
}
