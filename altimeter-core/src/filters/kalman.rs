// filters/kalman.rs
use super::ScalarEstimator;

/// Number of times the seed is fed through the filter on reset so the first
/// real samples do not visibly lag.
const WARM_UP_STEPS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KalmanTuning {
    pub measurement_error: f64,
    pub estimate_error: f64,
    /// Process noise (q). Larger reacts faster and passes more noise.
    pub process_noise: f64,
}

impl KalmanTuning {
    /// Tuning for the barometric altitude path.
    pub const ALTITUDE: Self = Self::new(1.0, 1.0, 0.001);
    /// Lower latency tuning for attitude-rate signals.
    pub const FAST: Self = Self::new(1.0, 1.0, 0.05);

    pub const fn new(measurement_error: f64, estimate_error: f64, process_noise: f64) -> Self {
        Self {
            measurement_error,
            estimate_error,
            process_noise,
        }
    }

    /// Both error terms must stay strictly positive or the gain divides by zero.
    pub fn is_valid(&self) -> bool {
        self.measurement_error.is_finite()
            && self.estimate_error.is_finite()
            && self.process_noise.is_finite()
            && self.measurement_error > 0.0
            && self.estimate_error > 0.0
            && self.process_noise >= 0.0
    }
}

impl Default for KalmanTuning {
    fn default() -> Self {
        Self::ALTITUDE
    }
}

/// Scalar Kalman filter with an adaptive estimate error.
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    tuning: KalmanTuning,
    err_measured: f64,
    err_estimated: f64,
    q: f64,
    last_estimate: f64,
}

impl KalmanFilter {
    /// Builds a filter seeded at zero. Falls back to [`KalmanTuning::ALTITUDE`]
    /// when `tuning` would break the positive-error invariant.
    pub fn new(tuning: KalmanTuning) -> Self {
        let tuning = if tuning.is_valid() {
            tuning
        } else {
            KalmanTuning::ALTITUDE
        };
        let mut filter = Self {
            tuning,
            err_measured: tuning.measurement_error,
            err_estimated: tuning.estimate_error,
            q: tuning.process_noise,
            last_estimate: 0.0,
        };
        filter.reset(0.0);
        filter
    }

    pub fn tuning(&self) -> KalmanTuning {
        self.tuning
    }

    pub fn estimate_error(&self) -> f64 {
        self.err_estimated
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(KalmanTuning::default())
    }
}

impl ScalarEstimator for KalmanFilter {
    fn step(&mut self, measurement: f64) -> f64 {
        let gain = self.err_estimated / (self.err_estimated + self.err_measured);
        let estimate = self.last_estimate + gain * (measurement - self.last_estimate);

        self.err_estimated =
            (1.0 - gain) * self.err_estimated + libm::fabs(self.last_estimate - estimate) * self.q;
        self.last_estimate = estimate;
        estimate
    }

    fn reset(&mut self, seed: f64) {
        self.err_measured = self.tuning.measurement_error;
        self.err_estimated = self.tuning.estimate_error;
        self.q = self.tuning.process_noise;
        self.last_estimate = seed;
        for _ in 0..WARM_UP_STEPS {
            self.step(seed);
        }
    }

    fn estimate(&self) -> f64 {
        self.last_estimate
    }
}
