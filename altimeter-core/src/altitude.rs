// altitude.rs
use crate::filters::{AveragingFilter, KalmanFilter, KalmanTuning, LowPassFilter, ScalarEstimator};
use crate::sensors::{Barometer, SensorError, is_plausible_pressure, pressure_to_altitude};
use crate::{debug, info, warn};

/// Pressure readings averaged into the pad baseline on reset.
pub const BASELINE_SAMPLES: usize = 8;

/// Turns raw barometric pressure into pad-relative altitude and vertical
/// velocity.
///
/// The baseline pressure is captured on every [`reset`](Self::reset), so the
/// output is insulated from the day's absolute pressure. Invalid readings are
/// dropped before they reach the filters.
pub struct AltitudeTracker<B: Barometer> {
    barometer: B,
    ready: bool,
    sea_level_pa: f64,
    baseline_pressure: f64,
    reference_altitude: f64,
    altitude_filter: KalmanFilter,
    velocity_filter: LowPassFilter,
    last_update_us: Option<u64>,
    skipped_samples: u32,
}

impl<B: Barometer> AltitudeTracker<B> {
    pub fn new(
        barometer: B,
        sea_level_pa: f64,
        altitude_tuning: KalmanTuning,
        velocity_smoothing: f64,
    ) -> Self {
        Self {
            barometer,
            ready: false,
            sea_level_pa,
            baseline_pressure: 0.0,
            reference_altitude: 0.0,
            altitude_filter: KalmanFilter::new(altitude_tuning),
            velocity_filter: LowPassFilter::new(velocity_smoothing, 0.0),
            last_update_us: None,
            skipped_samples: 0,
        }
    }

    /// Swaps in new filter settings. The filters restart from zero, so this
    /// is only called right before a [`reset`](Self::reset).
    pub fn configure(&mut self, sea_level_pa: f64, altitude_tuning: KalmanTuning, velocity_smoothing: f64) {
        self.sea_level_pa = sea_level_pa;
        self.altitude_filter = KalmanFilter::new(altitude_tuning);
        self.velocity_filter = LowPassFilter::new(velocity_smoothing, 0.0);
    }

    /// Brings the barometer up. A failure is not fatal: the tracker stays
    /// unready and altitude-based triggers are unavailable.
    pub fn start(&mut self) -> bool {
        match self.barometer.begin() {
            Ok(()) => {
                self.ready = true;
                info!("Barometer started");
                self.reset();
                true
            }
            Err(e) => {
                self.ready = false;
                warn!("Barometer init failed: {:?}", e);
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Captures the current pressure as the pad baseline and restarts both
    /// estimators at zero. The next update only seeds the velocity timing.
    pub fn reset(&mut self) {
        self.altitude_filter.reset(0.0);
        self.velocity_filter.reset(0.0);
        self.last_update_us = None;
        self.skipped_samples = 0;

        if !self.ready {
            return;
        }

        match self.average_pressure() {
            Some(pressure) => {
                self.baseline_pressure = pressure;
                self.reference_altitude = pressure_to_altitude(pressure, self.sea_level_pa);
            }
            None => {
                self.baseline_pressure = 0.0;
                warn!("No valid pressure for the pad baseline");
            }
        }
        if let Ok(alt) = self.barometer.read_altitude(self.sea_level_pa) {
            self.reference_altitude = alt;
        }
        info!("Pad altitude: {}", self.reference_altitude);
    }

    fn average_pressure(&mut self) -> Option<f64> {
        let mut average = AveragingFilter::<BASELINE_SAMPLES>::new(0.0);
        let mut seeded = false;
        for _ in 0..BASELINE_SAMPLES {
            match self.barometer.read_pressure() {
                Ok(p) if is_plausible_pressure(p) => {
                    if !seeded {
                        average.reset(p);
                        seeded = true;
                    }
                    average.step(p);
                }
                _ => {}
            }
        }
        seeded.then(|| average.estimate())
    }

    /// Reads one pressure sample and advances the estimators.
    ///
    /// Returns false when the sample was unusable; the previous estimate is
    /// kept untouched in that case.
    pub fn update(&mut self, now_us: u64) -> bool {
        if !self.ready {
            return false;
        }

        let pressure = match self.barometer.read_pressure() {
            Ok(p) if is_plausible_pressure(p) && self.baseline_pressure > 0.0 => p,
            Ok(_) => return self.skip(SensorError::InvalidReading),
            Err(e) => return self.skip(e),
        };

        let relative = pressure_to_altitude(pressure, self.baseline_pressure);

        // Raw sample against the previous estimate; dt runs from the last
        // good sample, not the nominal tick period.
        if let Some(last_us) = self.last_update_us {
            let dt_us = now_us.saturating_sub(last_us);
            if dt_us > 0 {
                let last_filtered = self.altitude_filter.estimate();
                let velocity = (relative - last_filtered) / dt_us as f64 * 1_000_000.0;
                self.velocity_filter.step(velocity);
            }
        }
        self.altitude_filter.step(relative);
        self.last_update_us = Some(now_us);
        true
    }

    fn skip(&mut self, reason: SensorError) -> bool {
        self.skipped_samples = self.skipped_samples.saturating_add(1);
        debug!("Pressure sample skipped: {:?}", reason);
        false
    }

    /// Filtered altitude above the pad, meters.
    pub fn altitude(&self) -> f64 {
        self.altitude_filter.estimate()
    }

    /// Smoothed vertical velocity, m/s.
    pub fn vertical_velocity(&self) -> f64 {
        self.velocity_filter.estimate()
    }

    /// Absolute altitude of the pad captured at the last reset.
    pub fn reference_altitude(&self) -> f64 {
        self.reference_altitude
    }

    pub fn reference_pressure(&self) -> f64 {
        self.baseline_pressure
    }

    pub fn skipped_samples(&self) -> u32 {
        self.skipped_samples
    }

    pub fn barometer_mut(&mut self) -> &mut B {
        &mut self.barometer
    }
}
