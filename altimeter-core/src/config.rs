// config.rs
use crate::filters::KalmanTuning;

/// Operator-settable flight parameters, consumed at arm time only.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct FlightConfig {
    /// Main chute deploys below this altitude (m above pad) while descending.
    pub deployment_altitude_m: f64,
    /// Longest a pyro channel may stay energized.
    pub max_fire_time_ms: u64,
    /// Acceleration (m/s²) that starts the flight.
    pub flight_start_threshold_acc: f64,
    /// Altitude (m) that starts the flight.
    pub flight_start_threshold_alt: f64,
    /// Below this altitude (m) a descending vehicle is considered landed.
    pub flight_end_threshold_alt: f64,
    /// Drop below apogee (m) that marks the start of the descent.
    pub descent_threshold: f64,
    /// Acceleration (m/s²) under which powered ascent is considered over.
    pub burnout_threshold_acc: f64,
    /// Period of the sample ticker.
    pub sample_period_ms: u64,
    /// Sea level pressure (Pa) for the absolute pad altitude.
    pub sea_level_pressure_pa: f64,
    /// Subtract standard gravity from the acceleration magnitude.
    pub gravity_compensation: bool,
    pub drogue_servo: ServoAngles,
    pub main_servo: ServoAngles,
    pub altitude_filter: KalmanTuning,
    /// Low-pass bias for the vertical velocity estimate, in [0, 1).
    pub velocity_smoothing: f64,
}

/// Servo release positions, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoAngles {
    /// Position that releases the chute.
    pub on_angle: u8,
    /// Armed / safe position.
    pub off_angle: u8,
}

pub const MAX_SERVO_ANGLE: u8 = 180;

impl ServoAngles {
    pub const fn new(on_angle: u8, off_angle: u8) -> Self {
        Self {
            on_angle,
            off_angle,
        }
    }
}

impl Default for ServoAngles {
    fn default() -> Self {
        Self::new(35, 178)
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            deployment_altitude_m: 100.0,
            max_fire_time_ms: 5_000,
            flight_start_threshold_acc: 20.0,
            flight_start_threshold_alt: 30.0,
            flight_end_threshold_alt: 30.0,
            descent_threshold: 15.0,
            burnout_threshold_acc: 11.0,
            sample_period_ms: 50,
            sea_level_pressure_pa: 101_325.0,
            gravity_compensation: false,
            drogue_servo: ServoAngles::default(),
            main_servo: ServoAngles::default(),
            altitude_filter: KalmanTuning::default(),
            velocity_smoothing: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A threshold is zero, negative or not finite.
    InvalidThreshold(&'static str),
    /// The main chute could never fire before landing is detected.
    DeploymentBelowLandingThreshold,
    ZeroFireTime,
    ZeroSamplePeriod,
    SmoothingOutOfRange,
    InvalidFilterTuning,
    ServoAngleOutOfRange,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidThreshold(name) => write!(f, "{name} must be positive and finite"),
            Self::DeploymentBelowLandingThreshold => {
                f.write_str("deployment altitude must be above the landing threshold")
            }
            Self::ZeroFireTime => f.write_str("max fire time must be non-zero"),
            Self::ZeroSamplePeriod => f.write_str("sample period must be non-zero"),
            Self::SmoothingOutOfRange => f.write_str("velocity smoothing must be in [0, 1)"),
            Self::InvalidFilterTuning => f.write_str("kalman errors must be strictly positive"),
            Self::ServoAngleOutOfRange => write!(f, "servo angles must be <= {MAX_SERVO_ANGLE}"),
        }
    }
}

impl core::error::Error for ConfigError {}

fn positive(value: f64, name: &'static str) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(name))
    }
}

impl FlightConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive(self.deployment_altitude_m, "deployment_altitude_m")?;
        positive(self.flight_start_threshold_acc, "flight_start_threshold_acc")?;
        positive(self.flight_start_threshold_alt, "flight_start_threshold_alt")?;
        positive(self.flight_end_threshold_alt, "flight_end_threshold_alt")?;
        positive(self.descent_threshold, "descent_threshold")?;
        positive(self.burnout_threshold_acc, "burnout_threshold_acc")?;
        positive(self.sea_level_pressure_pa, "sea_level_pressure_pa")?;

        if self.deployment_altitude_m <= self.flight_end_threshold_alt {
            return Err(ConfigError::DeploymentBelowLandingThreshold);
        }
        if self.max_fire_time_ms == 0 {
            return Err(ConfigError::ZeroFireTime);
        }
        if self.sample_period_ms == 0 {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        if !(0.0..1.0).contains(&self.velocity_smoothing) {
            return Err(ConfigError::SmoothingOutOfRange);
        }
        if !self.altitude_filter.is_valid() {
            return Err(ConfigError::InvalidFilterTuning);
        }
        let angles = [self.drogue_servo, self.main_servo];
        if angles
            .iter()
            .any(|a| a.on_angle > MAX_SERVO_ANGLE || a.off_angle > MAX_SERVO_ANGLE)
        {
            return Err(ConfigError::ServoAngleOutOfRange);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(FlightConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_main_must_deploy_above_landing() {
        let config = FlightConfig {
            deployment_altitude_m: 25.0,
            flight_end_threshold_alt: 30.0,
            ..FlightConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DeploymentBelowLandingThreshold)
        );
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let config = FlightConfig {
            descent_threshold: f64::NAN,
            ..FlightConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreshold("descent_threshold"))
        );
    }

    #[test]
    fn test_rejects_unity_smoothing() {
        let config = FlightConfig {
            velocity_smoothing: 1.0,
            ..FlightConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::SmoothingOutOfRange));
    }

    #[test]
    fn test_rejects_servo_past_travel() {
        let mut config = FlightConfig::default();
        config.main_servo.off_angle = 200;
        assert_eq!(config.validate(), Err(ConfigError::ServoAngleOutOfRange));
    }
}
