// tests/flight.rs
//! Whole flights through `FlightComputer` with simulated hardware.

use altimeter_core::{
    Accelerometer, Actuator, Barometer, ChannelLogger, DeviceRole, DeviceState, FlightComputer,
    FlightConfig, FlightDataPoint, FlightEvent, FlightLogger, FlightMillis, FlightPhase,
    FlightRecord, LogBuffer, LogChannel, LogEntry, RecoveryDevice, SensorError, TickFlag,
    log::MAX_LOG_LINE_LEN,
};
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};
use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

const PAD_ELEVATION_M: f64 = 250.0;
const SEA_LEVEL_PA: f64 = 101_325.0;
const TICK_MS: u64 = 50;

/// Shared truth the simulated sensors read from.
#[derive(Clone, Default)]
struct World {
    altitude: Rc<Cell<f64>>,
    acceleration: Rc<Cell<f64>>,
}

impl World {
    fn set(&self, altitude: f64, acceleration: f64) {
        self.altitude.set(altitude);
        self.acceleration.set(acceleration);
    }
}

struct SimBarometer {
    world: World,
    alive: bool,
}

impl Barometer for SimBarometer {
    fn begin(&mut self) -> Result<(), SensorError> {
        if self.alive {
            Ok(())
        } else {
            Err(SensorError::NotResponding)
        }
    }

    fn read_pressure(&mut self) -> Result<f64, SensorError> {
        let h = PAD_ELEVATION_M + self.world.altitude.get();
        Ok(SEA_LEVEL_PA * (1.0 - h / 44_330.0).powf(1.0 / 0.190_295))
    }
}

struct SimImu {
    world: World,
    alive: bool,
}

impl Accelerometer for SimImu {
    fn begin(&mut self) -> Result<(), SensorError> {
        if self.alive {
            Ok(())
        } else {
            Err(SensorError::NotResponding)
        }
    }

    fn read_acceleration(&mut self) -> Result<[f64; 3], SensorError> {
        Ok([0.0, 0.0, self.world.acceleration.get()])
    }
}

struct Relay(Rc<Cell<bool>>);

impl PinErrorType for Relay {
    type Error = Infallible;
}

impl OutputPin for Relay {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

struct UnusedServo;

impl PwmErrorType for UnusedServo {
    type Error = Infallible;
}

impl SetDutyCycle for UnusedServo {
    fn max_duty_cycle(&self) -> u16 {
        1_000
    }
    fn set_duty_cycle(&mut self, _duty: u16) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryLogger {
    samples: Vec<(FlightDataPoint, bool)>,
    records: Vec<(FlightRecord, u32)>,
    events: Vec<&'static str>,
    index: u32,
}

impl FlightLogger for MemoryLogger {
    fn log_sample(&mut self, point: &FlightDataPoint, is_trigger_point: bool) {
        self.samples.push((*point, is_trigger_point));
    }
    fn finalize(&mut self, record: &FlightRecord, flight_index: u32) {
        self.records.push((*record, flight_index));
    }
    fn next_flight_index(&mut self) -> u32 {
        self.index += 1;
        self.index
    }
    fn clear_buffer(&mut self) {
        self.samples.clear();
    }
    fn log_event(&mut self, _timestamp_ms: FlightMillis, msg: &'static str) {
        self.events.push(msg);
    }
}

type Computer<'a> = FlightComputer<'a, SimBarometer, SimImu, Relay, UnusedServo>;

struct Bench {
    world: World,
    drogue_pin: Rc<Cell<bool>>,
    main_pin: Rc<Cell<bool>>,
}

impl Bench {
    fn new() -> Self {
        Self {
            world: World::default(),
            drogue_pin: Rc::new(Cell::new(false)),
            main_pin: Rc::new(Cell::new(false)),
        }
    }

    fn computer<'a>(&self, flag: &'a TickFlag, baro_alive: bool, imu_alive: bool) -> Computer<'a> {
        FlightComputer::new(
            SimBarometer {
                world: self.world.clone(),
                alive: baro_alive,
            },
            SimImu {
                world: self.world.clone(),
                alive: imu_alive,
            },
            RecoveryDevice::pyro(1, Relay(self.drogue_pin.clone())),
            RecoveryDevice::pyro(2, Relay(self.main_pin.clone())),
            flag,
            FlightConfig::default(),
        )
        .unwrap()
    }
}

/// Boost at 50 m/s² net for 2 s from t=1 s, ballistic coast, then a steady
/// 20 m/s descent. Returns (altitude, acceleration magnitude).
fn profile(t_s: f64) -> (f64, f64) {
    const G: f64 = 9.80665;
    if t_s < 1.0 {
        return (0.0, G);
    }
    let tb = t_s - 1.0;
    if tb < 2.0 {
        return (25.0 * tb * tb, 60.0);
    }
    let tc = tb - 2.0;
    let t_apogee = 100.0 / G;
    if tc < t_apogee {
        return (100.0 + 100.0 * tc - 0.5 * G * tc * tc, 0.0);
    }
    let apogee = 100.0 + 100.0 * t_apogee - 0.5 * G * t_apogee * t_apogee;
    ((apogee - 20.0 * (tc - t_apogee)).max(0.0), G)
}

/// Drives the computer through the profile, one tick per 50 ms, until it
/// lands or `max_ticks` run out.
fn fly<L: FlightLogger>(
    bench: &Bench,
    flag: &TickFlag,
    fc: &mut Computer<'_>,
    logger: &mut L,
    max_ticks: u64,
) -> Vec<(FlightMillis, FlightEvent)> {
    let mut seen = Vec::new();
    for i in 0..max_ticks {
        let t_ms = i * TICK_MS;
        let (altitude, acceleration) = profile(t_ms as f64 / 1_000.0);
        bench.world.set(altitude, acceleration);
        flag.raise();
        if let Some(events) = fc.service(t_ms * 1_000, logger) {
            seen.extend(events.into_iter().map(|e| (t_ms, e)));
        }
        if fc.phase() == FlightPhase::OnGround {
            break;
        }
    }
    seen
}

fn position(seen: &[(FlightMillis, FlightEvent)], event: FlightEvent) -> usize {
    seen.iter()
        .position(|(_, e)| *e == event)
        .unwrap_or_else(|| panic!("{event:?} never happened: {seen:?}"))
}

#[test]
fn full_flight_deploys_in_order() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, true, true);
    let mut logger = MemoryLogger::default();

    let readiness = fc.init();
    assert!(readiness.barometer && readiness.imu);
    assert!(fc.arm(0, &mut logger));
    assert!(flag.is_active());
    assert_eq!(fc.status().phase, FlightPhase::ReadyToFly);

    let seen = fly(&bench, &flag, &mut fc, &mut logger, 2_000);

    assert_eq!(fc.phase(), FlightPhase::OnGround);
    assert!(!flag.is_active());

    let start = position(&seen, FlightEvent::FlightStarted);
    let burnout = position(&seen, FlightEvent::Burnout);
    let drogue = position(&seen, FlightEvent::DrogueDeployed);
    let timeout = position(&seen, FlightEvent::IgnitionTimeout(DeviceRole::Drogue));
    let main = position(&seen, FlightEvent::MainDeployed);
    let landed = position(&seen, FlightEvent::Landed);
    assert!(start < burnout && burnout < drogue && drogue < timeout);
    assert!(timeout < main && main < landed);
    assert_eq!(seen[start].0, 1_000);
    assert!(!seen.iter().any(|(_, e)| *e == FlightEvent::IgnitionTimeout(DeviceRole::Main)));

    assert_eq!(logger.records.len(), 1);
    let (record, index) = logger.records[0];
    assert_eq!(index, 1);
    assert!(record.apogee > 550.0 && record.apogee < 620.0, "apogee {}", record.apogee);
    assert!(record.drogue_ejection_altitude < record.apogee - 15.0);
    assert!(record.main_ejection_altitude < 100.0 && record.main_ejection_altitude > 30.0);
    assert_eq!(record.acceleration_trigger_time_ms, Some(1_000));
    assert!(record.altitude_trigger_time_ms.is_some());
    assert!(record.burnout_time_ms.unwrap() >= 3_000);
    assert!(record.max_acceleration > 59.0);

    // Both pyro channels are cold once on the ground.
    assert!(!bench.drogue_pin.get());
    assert!(!bench.main_pin.get());
    assert_eq!(
        fc.controller().device(DeviceRole::Main).state(),
        DeviceState::Off
    );

    assert_eq!(logger.samples.iter().filter(|(_, trigger)| *trigger).count(), 1);
    assert!(logger.events.contains(&"Landed"));

    let status = fc.status();
    assert_eq!(status.last_apogee, record.apogee);
    assert!(status.indicators.buzzer);
    assert!((status.pad_altitude - PAD_ELEVATION_M).abs() < 1.0);
}

#[test]
fn barometer_failure_degrades_to_acceleration_only() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, false, true);
    let mut logger = MemoryLogger::default();

    let readiness = fc.init();
    assert!(!readiness.barometer);
    assert!(readiness.imu);
    fc.arm(0, &mut logger);

    let seen = fly(&bench, &flag, &mut fc, &mut logger, 1_200);

    position(&seen, FlightEvent::FlightStarted);
    assert_eq!(fc.phase(), FlightPhase::Ascending);
    assert!(!seen.iter().any(|(_, e)| *e == FlightEvent::DrogueDeployed));
    assert!(!bench.drogue_pin.get());
    assert!(logger.records.is_empty());
    assert!(!fc.status().barometer_ready);
}

#[test]
fn arm_without_sensors_keeps_ticker_off() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, false, false);
    let mut logger = MemoryLogger::default();

    assert!(!fc.init().any());
    assert!(fc.arm(0, &mut logger));
    assert_eq!(fc.phase(), FlightPhase::ReadyToFly);
    assert!(!flag.is_active());

    flag.raise();
    assert!(fc.service(50_000, &mut logger).is_none());
}

#[test]
fn test_flight_runs_full_sequence_on_the_bench() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, false, false);
    let channel = LogChannel::<128>::new();
    let mut logger = ChannelLogger::new(&channel, 10);

    fc.init();
    fc.arm(0, &mut logger);
    assert!(fc.run_test());
    assert!(!fc.run_test());
    assert!(flag.is_active());

    let mut events = Vec::new();
    for i in 1..=1_000u64 {
        flag.raise();
        if let Some(step) = fc.service(i * TICK_MS * 1_000, &mut logger) {
            events.extend(step);
        }
        if fc.phase() == FlightPhase::OnGround {
            break;
        }
    }

    assert_eq!(fc.phase(), FlightPhase::OnGround);
    assert!(!fc.is_test_flight());
    assert!(events.contains(&FlightEvent::IgnitionTimeout(DeviceRole::Drogue)));
    assert_eq!(logger.dropped(), 0);

    let mut records = Vec::new();
    let mut rows = 0;
    while let Ok(entry) = channel.try_receive() {
        let mut buf = LogBuffer::<MAX_LOG_LINE_LEN>::new();
        buf.write_entry(&entry).unwrap();
        rows += 1;
        if let LogEntry::Record {
            record,
            flight_index,
        } = entry
        {
            assert!(buf.get_active_buffer().starts_with(b"R,0,10,"));
            records.push((record, flight_index));
        }
    }
    assert!(rows > 20);
    assert_eq!(records.len(), 1);

    let (record, index) = records[0];
    assert_eq!(index, 10);
    assert_eq!(record.apogee, 400.0);
    assert_eq!(record.drogue_ejection_altitude, 384.0);
    assert_eq!(record.main_ejection_altitude, 98.0);
    assert_eq!(record.max_acceleration, 4.0);
    assert!(record.burnout_time_ms.is_some());
}

#[test]
fn staged_config_waits_for_next_arm() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, true, true);
    let mut logger = MemoryLogger::default();
    fc.init();
    fc.arm(0, &mut logger);

    fc.set_deployment_altitude(200.0).unwrap();
    assert_eq!(fc.status().deployment_altitude, 200.0);
    assert_eq!(fc.controller().config().deployment_altitude_m, 100.0);

    // Below the landing threshold: rejected, the staged value survives.
    assert!(fc.set_deployment_altitude(10.0).is_err());
    assert_eq!(fc.staged_config().unwrap().deployment_altitude_m, 200.0);

    // Re-arming while ready is ignored, so nothing is applied yet.
    assert!(!fc.arm(100, &mut logger));
    assert_eq!(fc.controller().config().deployment_altitude_m, 100.0);

    fc.force_landed();
    assert!(!flag.is_active());
    assert!(fc.arm(200, &mut logger));
    assert_eq!(fc.controller().config().deployment_altitude_m, 200.0);
    assert_eq!(fc.config().deployment_altitude_m, 200.0);
    assert!(fc.staged_config().is_none());
    assert_eq!(fc.status().flight_index, 2);
    assert!(logger.records.is_empty());
}

#[test]
fn rearm_after_landing_starts_clean() {
    let bench = Bench::new();
    let flag = TickFlag::new();
    let mut fc = bench.computer(&flag, true, true);
    let mut logger = MemoryLogger::default();
    fc.init();
    fc.arm(0, &mut logger);
    fly(&bench, &flag, &mut fc, &mut logger, 2_000);
    assert_eq!(fc.phase(), FlightPhase::OnGround);
    let landed = *fc.controller().record();
    assert!(landed.is_valid());

    bench.world.set(0.0, 9.80665);
    assert!(fc.arm(60_000, &mut logger));
    assert!(flag.is_active());
    assert_eq!(*fc.controller().record(), FlightRecord::new());
    assert_eq!(fc.controller().flight_index(), 2);
    assert_eq!(fc.status().last_apogee, landed.apogee);

    let drogue = fc.controller().device(DeviceRole::Drogue);
    assert!(!drogue.is_deployed());
    assert!(!drogue.timed_reset());
    assert!(matches!(drogue.actuator(), Actuator::Pyro(_)));
    assert!(!bench.drogue_pin.get());
}
