// types.rs
use proc_macros::TelemetryPayload;

/// Milliseconds on the monotonic flight clock.
pub type FlightMillis = u64;

/// Number of recovery channels driven by the flight controller.
pub const DEVICE_COUNT: usize = 2;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightPhase {
    ReadyToFly = 0, // Armed on the pad
    Ascending = 1,  // Powered or coasting ascent
    Descending = 2, // Past apogee, drogue out
    OnGround = 3,   // Landed or not yet armed
}

impl FlightPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ReadyToFly => "Ready",
            Self::Ascending => "Ascending",
            Self::Descending => "Descending",
            Self::OnGround => "On Ground",
        }
    }

    /// True while the sample ticker should be running.
    pub const fn is_sampling(self) -> bool {
        !matches!(self, Self::OnGround)
    }
}

/// Index into the controller's device array.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceRole {
    Drogue = 0,
    Main = 1,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; DEVICE_COUNT] = [DeviceRole::Drogue, DeviceRole::Main];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One tick's worth of filtered sensor input. Never retained past the tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample {
    pub timestamp_ms: FlightMillis,
    /// Meters above the pad.
    pub altitude: f64,
    /// m/s, positive up. Informational only.
    pub vertical_velocity: f64,
    /// Acceleration magnitude in m/s².
    pub acceleration: f64,
}

/// Reduced-rate flight trace point handed to the external logger.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize, TelemetryPayload)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightDataPoint {
    #[telemetry(timestamp)]
    pub timestamp_ms: FlightMillis,
    pub altitude: f64,
    pub acceleration: f64,
}

impl From<&SensorSample> for FlightDataPoint {
    fn from(sample: &SensorSample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            altitude: sample.altitude,
            acceleration: sample.acceleration,
        }
    }
}

/// Summary of one armed flight.
///
/// Zeroed on arm, written only by the flight controller while the flight is
/// in progress and frozen once the phase reaches [`FlightPhase::OnGround`].
/// Time offsets are measured from the arm instant. Trigger and burnout times
/// are `None` until they fire and are written at most once.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize, TelemetryPayload)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlightRecord {
    pub apogee: f64,
    pub apogee_time_ms: FlightMillis,
    pub main_ejection_altitude: f64,
    pub drogue_ejection_altitude: f64,
    pub burnout_altitude: f64,
    pub burnout_time_ms: Option<FlightMillis>,
    pub acceleration_trigger_time_ms: Option<FlightMillis>,
    pub altitude_trigger_time_ms: Option<FlightMillis>,
    pub max_acceleration: f64,
}

/// Upper bound on the postcard encoding of a [`FlightRecord`].
pub const FLIGHT_RECORD_MAX_SIZE: usize = 96;

impl FlightRecord {
    pub const fn new() -> Self {
        Self {
            apogee: 0.0,
            apogee_time_ms: 0,
            main_ejection_altitude: 0.0,
            drogue_ejection_altitude: 0.0,
            burnout_altitude: 0.0,
            burnout_time_ms: None,
            acceleration_trigger_time_ms: None,
            altitude_trigger_time_ms: None,
            max_acceleration: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// A record holds a flight if anything beyond the zeroed state was written.
    pub fn is_valid(&self) -> bool {
        self.apogee != 0.0
            || self.main_ejection_altitude != 0.0
            || self.drogue_ejection_altitude != 0.0
            || self.max_acceleration != 0.0
            || self.burnout_altitude != 0.0
    }

    /// Serializes the record for the persistence collaborator.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Sensor readiness, latched at arm time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReadiness {
    pub barometer: bool,
    pub imu: bool,
}

impl SensorReadiness {
    pub const fn any(&self) -> bool {
        self.barometer || self.imu
    }
}

/// Digital status outputs owned by the flight controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Indicators {
    pub ready: bool,
    pub message: bool,
    pub buzzer: bool,
}

/// Things that happened during one controller step, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlightEvent {
    AccelerationTrigger,
    AltitudeTrigger,
    FlightStarted,
    Burnout,
    DrogueDeployed,
    Landed,
    MainDeployed,
    IgnitionTimeout(DeviceRole),
}

/// Snapshot for the external display / status page.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub phase: FlightPhase,
    pub barometer_ready: bool,
    pub imu_ready: bool,
    pub pad_altitude: f64,
    pub reference_pressure: f64,
    pub deployment_altitude: f64,
    pub last_apogee: f64,
    pub flight_index: u32,
    pub indicators: Indicators,
}
