// computer.rs
use crate::altitude::AltitudeTracker;
use crate::config::{ConfigError, FlightConfig};
use crate::log::FlightLogger;
use crate::recovery::RecoveryDevice;
use crate::scheduler::TickFlag;
use crate::sensors::{Accelerometer, Barometer, acceleration_magnitude};
use crate::state_machine::{FlightPhaseController, StepEvents};
use crate::test_flight::TestFlight;
use crate::types::{FlightMillis, FlightPhase, SensorReadiness, SensorSample, StatusReport};
use crate::{debug, info, warn};
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

/// Application root: owns the sensors, the altitude tracker and the phase
/// controller, and wires them to the sample flag.
///
/// Everything the flight needs is constructed once and owned here; the
/// ticker side only ever sees the [`TickFlag`].
pub struct FlightComputer<'a, B: Barometer, A, P, S> {
    tracker: AltitudeTracker<B>,
    imu: A,
    imu_ready: bool,
    controller: FlightPhaseController<P, S>,
    flag: &'a TickFlag,
    config: FlightConfig,
    staged: Option<FlightConfig>,
    test_flight: Option<TestFlight>,
    last_acceleration: f64,
}

impl<'a, B, A, P, S> FlightComputer<'a, B, A, P, S>
where
    B: Barometer,
    A: Accelerometer,
    P: OutputPin,
    S: SetDutyCycle,
{
    pub fn new(
        barometer: B,
        imu: A,
        drogue: RecoveryDevice<P, S>,
        main: RecoveryDevice<P, S>,
        flag: &'a TickFlag,
        config: FlightConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tracker: AltitudeTracker::new(
                barometer,
                config.sea_level_pressure_pa,
                config.altitude_filter,
                config.velocity_smoothing,
            ),
            imu,
            imu_ready: false,
            controller: FlightPhaseController::new(drogue, main, config),
            flag,
            config,
            staged: None,
            test_flight: None,
            last_acceleration: 0.0,
        })
    }

    /// Brings up both sensors. Failures leave the computer running in a
    /// degraded mode.
    pub fn init(&mut self) -> SensorReadiness {
        self.tracker.start();
        self.imu_ready = match self.imu.begin() {
            Ok(()) => {
                info!("IMU started");
                true
            }
            Err(e) => {
                warn!("IMU init failed: {:?}", e);
                false
            }
        };
        let readiness = self.readiness();
        if !readiness.any() {
            warn!("No sensors ready");
        }
        readiness
    }

    pub fn readiness(&self) -> SensorReadiness {
        SensorReadiness {
            barometer: self.tracker.is_ready(),
            imu: self.imu_ready,
        }
    }

    /// Arms for the next flight. Applies any staged configuration, captures
    /// the pad baseline and starts sampling if a sensor is available.
    /// Ignored while already ReadyToFly.
    pub fn arm<L: FlightLogger + ?Sized>(&mut self, now_ms: FlightMillis, logger: &mut L) -> bool {
        if self.controller.phase() == FlightPhase::ReadyToFly {
            debug!("Arm ignored: already ready to fly");
            return false;
        }

        self.flag.stop();
        if let Some(config) = self.staged.take() {
            self.config = config;
            self.tracker.configure(
                config.sea_level_pressure_pa,
                config.altitude_filter,
                config.velocity_smoothing,
            );
            info!("Staged configuration applied");
        }
        self.tracker.reset();
        self.test_flight = None;
        self.last_acceleration = 0.0;

        let readiness = self.readiness();
        self.controller.arm(now_ms, readiness, self.config, logger);

        if readiness.any() {
            self.flag.start();
        } else {
            warn!("Armed without sensors: sampling stays off");
        }
        true
    }

    /// Replaces sensor input with the synthetic test profile for the rest of
    /// this arm cycle. Only accepted while ReadyToFly.
    pub fn run_test(&mut self) -> bool {
        if self.controller.phase() != FlightPhase::ReadyToFly || self.test_flight.is_some() {
            return false;
        }
        self.test_flight = Some(TestFlight::new());
        self.controller.assume_sensors_ready();
        if !self.flag.is_active() {
            self.flag.start();
        }
        info!("Test flight started");
        true
    }

    pub fn is_test_flight(&self) -> bool {
        self.test_flight.is_some()
    }

    /// Runs one tick if the flag says one is due.
    pub fn service<L: FlightLogger + ?Sized>(&mut self, now_us: u64, logger: &mut L) -> Option<StepEvents> {
        if !self.flag.take() {
            return None;
        }
        Some(self.tick(now_us, logger))
    }

    /// One full sample + step cycle.
    pub fn tick<L: FlightLogger + ?Sized>(&mut self, now_us: u64, logger: &mut L) -> StepEvents {
        let sample = self.sample(now_us);
        let events = self.controller.step(&sample, logger);

        if !self.controller.phase().is_sampling() {
            self.flag.stop();
            self.test_flight = None;
        }
        events
    }

    fn sample(&mut self, now_us: u64) -> SensorSample {
        let timestamp_ms = now_us / 1_000;
        if let Some(test_flight) = self.test_flight.as_mut() {
            return test_flight.next_sample(timestamp_ms);
        }

        if self.tracker.is_ready() {
            self.tracker.update(now_us);
        }
        if self.imu_ready {
            match self.imu.read_acceleration() {
                Ok(accel) => {
                    self.last_acceleration =
                        acceleration_magnitude(accel, self.config.gravity_compensation);
                }
                Err(e) => debug!("Acceleration sample skipped: {:?}", e),
            }
        }

        SensorSample {
            timestamp_ms,
            altitude: self.tracker.altitude(),
            vertical_velocity: self.tracker.vertical_velocity(),
            acceleration: self.last_acceleration,
        }
    }

    /// Stages a configuration for the next arm.
    pub fn set_config(&mut self, config: FlightConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.staged = Some(config);
        Ok(())
    }

    pub fn set_deployment_altitude(&mut self, meters: f64) -> Result<(), ConfigError> {
        let mut config = self.staged.unwrap_or(self.config);
        config.deployment_altitude_m = meters;
        self.set_config(config)
    }

    /// Manual abort.
    pub fn force_landed(&mut self) {
        self.controller.force_landed();
        self.flag.stop();
        self.test_flight = None;
    }

    pub fn status(&self) -> StatusReport {
        let readiness = self.readiness();
        StatusReport {
            phase: self.controller.phase(),
            barometer_ready: readiness.barometer,
            imu_ready: readiness.imu,
            pad_altitude: self.tracker.reference_altitude(),
            reference_pressure: self.tracker.reference_pressure(),
            deployment_altitude: self.staged.unwrap_or(self.config).deployment_altitude_m,
            last_apogee: self.controller.last_apogee(),
            flight_index: self.controller.flight_index(),
            indicators: self.controller.indicators(),
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.controller.phase()
    }

    /// The configuration the current (or last) flight runs with.
    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn staged_config(&self) -> Option<&FlightConfig> {
        self.staged.as_ref()
    }

    pub fn controller(&self) -> &FlightPhaseController<P, S> {
        &self.controller
    }

    pub fn tracker(&self) -> &AltitudeTracker<B> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut AltitudeTracker<B> {
        &mut self.tracker
    }

    pub fn imu_mut(&mut self) -> &mut A {
        &mut self.imu
    }
}
