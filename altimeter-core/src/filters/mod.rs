// filters/mod.rs
pub mod averaging;
pub mod kalman;
pub mod low_pass;

pub use averaging::*;
pub use kalman::*;
pub use low_pass::*;

/// A recursive single-variable estimator: one noisy sample in, one smoothed
/// value out.
pub trait ScalarEstimator {
    /// Feeds one measurement and returns the new estimate.
    fn step(&mut self, measurement: f64) -> f64;

    /// Restarts the estimator from a known value.
    fn reset(&mut self, seed: f64);

    /// The most recent estimate.
    fn estimate(&self) -> f64;
}
