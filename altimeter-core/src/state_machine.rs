use crate::config::FlightConfig;
use crate::log::FlightLogger;
use crate::recovery::{DeviceKind, RecoveryDevice};
use crate::types::{
    DEVICE_COUNT, DeviceRole, FlightDataPoint, FlightEvent, FlightMillis, FlightPhase,
    FlightRecord, Indicators, SensorReadiness, SensorSample,
};
use crate::{info, warn};
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use heapless::Vec;

/// Trace rate while on the pad or climbing: one sample in this many ticks.
pub const FAST_LOG_INTERVAL: u8 = 5;
/// Trace rate under canopy.
pub const SLOW_LOG_INTERVAL: u8 = 20;

/// Upper bound on events a single step can produce.
pub const MAX_EVENTS_PER_STEP: usize = 8;

pub type StepEvents = Vec<FlightEvent, MAX_EVENTS_PER_STEP>;

/// FlightPhaseController runs the flight state machine and owns the recovery
/// channels. One [`step`](Self::step) per scheduler tick; nothing in here
/// blocks or fails.
pub struct FlightPhaseController<P, S> {
    phase: FlightPhase,
    config: FlightConfig,
    /// Sensor readiness latched at arm.
    readiness: SensorReadiness,
    record: FlightRecord,
    flight_index: u32,
    arm_time_ms: FlightMillis,
    /// Apogee of the last completed flight, kept for the display.
    last_apogee: f64,
    indicators: Indicators,
    devices: [RecoveryDevice<P, S>; DEVICE_COUNT],
    log_countdown: u8,
}

impl<P, S> FlightPhaseController<P, S>
where
    P: OutputPin,
    S: SetDutyCycle,
{
    /// Constructs an unarmed controller. Nothing happens until [`arm`](Self::arm).
    pub fn new(
        drogue: RecoveryDevice<P, S>,
        main: RecoveryDevice<P, S>,
        config: FlightConfig,
    ) -> Self {
        Self {
            phase: FlightPhase::OnGround,
            config,
            readiness: SensorReadiness::default(),
            record: FlightRecord::new(),
            flight_index: 0,
            arm_time_ms: 0,
            last_apogee: 0.0,
            indicators: Indicators::default(),
            devices: [drogue, main],
            log_countdown: 0,
        }
    }

    /// Resets all flight bookkeeping and moves to ReadyToFly.
    ///
    /// Ignored while already ReadyToFly so a stray button press can never
    /// wipe a flight that is about to start. Returns whether the arm happened.
    pub fn arm<L: FlightLogger + ?Sized>(
        &mut self,
        now_ms: FlightMillis,
        readiness: SensorReadiness,
        config: FlightConfig,
        logger: &mut L,
    ) -> bool {
        if self.phase == FlightPhase::ReadyToFly {
            return false;
        }

        self.config = config;
        self.readiness = readiness;
        self.flight_index = logger.next_flight_index();
        self.record.reset();
        self.arm_time_ms = now_ms;
        self.log_countdown = 0;

        self.devices[DeviceRole::Drogue.index()].set_servo_angles(config.drogue_servo);
        self.devices[DeviceRole::Main.index()].set_servo_angles(config.main_servo);
        for device in self.devices.iter_mut() {
            device.reset();
        }

        self.indicators = Indicators {
            ready: true,
            message: false,
            buzzer: false,
        };
        self.phase = FlightPhase::ReadyToFly;

        logger.clear_buffer();
        logger.log_event(now_ms, "Ready To Fly");
        info!("Ready to fly, flight {}", self.flight_index);
        if !readiness.barometer {
            warn!("Barometer not ready: altitude triggers disabled for this flight");
        }
        if !readiness.imu {
            warn!("IMU not ready: acceleration triggers disabled for this flight");
        }
        true
    }

    /// Treat both sensors as ready for the rest of this arm cycle. Used when
    /// synthetic data replaces the sensors.
    pub fn assume_sensors_ready(&mut self) {
        self.readiness = SensorReadiness {
            barometer: true,
            imu: true,
        };
    }

    /// Runs one tick of the state machine against a fresh sample.
    pub fn step<L: FlightLogger + ?Sized>(
        &mut self,
        sample: &SensorSample,
        logger: &mut L,
    ) -> StepEvents {
        let mut events = StepEvents::new();
        let now = sample.timestamp_ms;

        if self.phase == FlightPhase::OnGround {
            self.check_ignition_timeouts(now, logger, &mut events);
            return events;
        }

        let altitude = sample.altitude;
        let acceleration = sample.acceleration;
        let altitude_ok = self.readiness.barometer;
        let acceleration_ok = self.readiness.imu;
        let since_arm = now.saturating_sub(self.arm_time_ms);
        let point = FlightDataPoint::from(sample);

        // --- 1. Reduced-rate trace ---
        if self.log_countdown == 0 {
            logger.log_sample(&point, false);
            let interval = match self.phase {
                FlightPhase::Descending => SLOW_LOG_INTERVAL,
                _ => FAST_LOG_INTERVAL,
            };
            self.log_countdown = interval - 1;
        } else {
            self.log_countdown -= 1;
        }

        // --- 2. Running statistics ---
        if altitude_ok && altitude > self.record.apogee {
            self.record.apogee = altitude;
            self.record.apogee_time_ms = since_arm;
        }
        if acceleration_ok && acceleration > self.record.max_acceleration {
            self.record.max_acceleration = acceleration;
        }

        // --- 3. Phase transitions ---
        match self.phase {
            FlightPhase::ReadyToFly => {
                let triggered = self.check_start_triggers(altitude, acceleration, since_arm, &mut events);
                if triggered {
                    self.phase = FlightPhase::Ascending;
                    self.indicators.ready = false;
                    self.indicators.message = true;
                    let _ = events.push(FlightEvent::FlightStarted);
                    logger.log_sample(&point, true);
                    logger.log_event(now, "Flight Started");
                    info!("Flight started at {} m", altitude);
                }
            }
            FlightPhase::Ascending => {
                // The slower trigger is still recorded for the flight history.
                self.check_start_triggers(altitude, acceleration, since_arm, &mut events);

                if acceleration_ok
                    && self.record.burnout_time_ms.is_none()
                    && acceleration < self.config.burnout_threshold_acc
                {
                    self.record.burnout_altitude = altitude;
                    self.record.burnout_time_ms = Some(since_arm);
                    let _ = events.push(FlightEvent::Burnout);
                    info!("Burnout at {} m", altitude);
                }

                if altitude_ok && altitude < self.record.apogee - self.config.descent_threshold {
                    self.phase = FlightPhase::Descending;
                    self.record.drogue_ejection_altitude = altitude;
                    self.devices[DeviceRole::Drogue.index()].enable(now);
                    let _ = events.push(FlightEvent::DrogueDeployed);
                    logger.log_event(now, "Descending");
                    info!("Descending, drogue out at {} m", altitude);
                }
            }
            FlightPhase::Descending => {
                if altitude_ok && altitude < self.config.flight_end_threshold_alt {
                    self.land(now, logger);
                    let _ = events.push(FlightEvent::Landed);
                }
            }
            FlightPhase::OnGround => {}
        }

        // --- 4. Main chute ---
        if self.phase == FlightPhase::Descending
            && altitude_ok
            && altitude < self.config.deployment_altitude_m
            && !self.devices[DeviceRole::Main.index()].is_deployed()
        {
            self.record.main_ejection_altitude = altitude;
            self.devices[DeviceRole::Main.index()].enable(now);
            let _ = events.push(FlightEvent::MainDeployed);
            logger.log_event(now, "Deploy Main");
            info!("Main deployed at {} m", altitude);
        }

        // --- 5. Safety ---
        self.check_ignition_timeouts(now, logger, &mut events);

        events
    }

    /// Records whichever start trigger fires for the first time. Returns true
    /// if one fired on this tick.
    fn check_start_triggers(
        &mut self,
        altitude: f64,
        acceleration: f64,
        since_arm: FlightMillis,
        events: &mut StepEvents,
    ) -> bool {
        let mut fired = false;
        if self.readiness.imu
            && self.record.acceleration_trigger_time_ms.is_none()
            && acceleration > self.config.flight_start_threshold_acc
        {
            self.record.acceleration_trigger_time_ms = Some(since_arm);
            let _ = events.push(FlightEvent::AccelerationTrigger);
            fired = true;
        }
        if self.readiness.barometer
            && self.record.altitude_trigger_time_ms.is_none()
            && altitude > self.config.flight_start_threshold_alt
        {
            self.record.altitude_trigger_time_ms = Some(since_arm);
            let _ = events.push(FlightEvent::AltitudeTrigger);
            fired = true;
        }
        fired
    }

    fn land<L: FlightLogger + ?Sized>(&mut self, now: FlightMillis, logger: &mut L) {
        self.phase = FlightPhase::OnGround;
        self.last_apogee = self.record.apogee;
        logger.log_event(now, "Landed");
        logger.finalize(&self.record, self.flight_index);
        self.safe_pyro_channels();
        self.indicators.buzzer = true;
        info!(
            "Landed. Flight {} apogee {} m",
            self.flight_index, self.record.apogee
        );
    }

    /// Pyro channels are switched off and reset. Servos keep their position so
    /// a released chute is not latched again.
    fn safe_pyro_channels(&mut self) {
        for device in self.devices.iter_mut() {
            if device.kind() == DeviceKind::Pyro {
                device.disable();
                device.reset();
            }
        }
    }

    fn check_ignition_timeouts<L: FlightLogger + ?Sized>(
        &mut self,
        now: FlightMillis,
        logger: &mut L,
        events: &mut StepEvents,
    ) {
        let max_fire_ms = self.config.max_fire_time_ms;
        for role in DeviceRole::ALL {
            let device = &mut self.devices[role.index()];
            if device.fire_time_exceeded(now, max_fire_ms) {
                device.trip_timeout();
                let _ = events.push(FlightEvent::IgnitionTimeout(role));
                logger.log_event(now, "Ignition Timeout");
            }
        }
    }

    /// Manual abort: ends the flight without finalizing a record.
    pub fn force_landed(&mut self) {
        if self.phase == FlightPhase::OnGround {
            return;
        }
        self.phase = FlightPhase::OnGround;
        self.indicators.ready = false;
        self.safe_pyro_channels();
        warn!("Flight {} ended manually", self.flight_index);
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn record(&self) -> &FlightRecord {
        &self.record
    }

    pub fn indicators(&self) -> Indicators {
        self.indicators
    }

    pub fn readiness(&self) -> SensorReadiness {
        self.readiness
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn flight_index(&self) -> u32 {
        self.flight_index
    }

    pub fn arm_time_ms(&self) -> FlightMillis {
        self.arm_time_ms
    }

    pub fn last_apogee(&self) -> f64 {
        self.last_apogee
    }

    pub fn device(&self, role: DeviceRole) -> &RecoveryDevice<P, S> {
        &self.devices[role.index()]
    }

    pub fn device_mut(&mut self, role: DeviceRole) -> &mut RecoveryDevice<P, S> {
        &mut self.devices[role.index()]
    }
}
