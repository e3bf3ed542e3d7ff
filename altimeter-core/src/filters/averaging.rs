// filters/averaging.rs
use super::ScalarEstimator;
use heapless::Deque;

/// Unweighted moving average over the last `N` samples.
///
/// Until `N` samples have been seen the window is padded with the reset seed.
#[derive(Clone, Debug)]
pub struct AveragingFilter<const N: usize> {
    window: Deque<f64, N>,
    current: f64,
}

impl<const N: usize> AveragingFilter<N> {
    pub fn new(seed: f64) -> Self {
        const {
            assert!(N > 0, "AveragingFilter needs a window of at least one sample");
        }
        let mut filter = Self {
            window: Deque::new(),
            current: seed,
        };
        filter.reset(seed);
        filter
    }
}

impl<const N: usize> ScalarEstimator for AveragingFilter<N> {
    fn step(&mut self, measurement: f64) -> f64 {
        if self.window.is_full() {
            self.window.pop_front();
        }
        // Cannot fail: a slot was freed above.
        let _ = self.window.push_back(measurement);

        let sum: f64 = self.window.iter().sum();
        self.current = sum / N as f64;
        self.current
    }

    fn reset(&mut self, seed: f64) {
        self.window.clear();
        while !self.window.is_full() {
            let _ = self.window.push_back(seed);
        }
        self.current = seed;
    }

    fn estimate(&self) -> f64 {
        self.current
    }
}
