// sensors.rs
//! Narrow interfaces to the sensor drivers. Bus transactions and chip setup
//! live in the driver crates; the core only sees these traits.

/// Standard gravity, m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The device did not answer during initialization.
    NotResponding,
    /// The device answered with a zero or out-of-range value.
    InvalidReading,
    Bus,
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotResponding => f.write_str("sensor not responding"),
            Self::InvalidReading => f.write_str("invalid sensor reading"),
            Self::Bus => f.write_str("sensor bus error"),
        }
    }
}

impl core::error::Error for SensorError {}

/// Converts a static pressure into meters above the `reference_pa` level
/// (international barometric formula).
pub fn pressure_to_altitude(pressure_pa: f64, reference_pa: f64) -> f64 {
    44_330.0 * (1.0 - libm::pow(pressure_pa / reference_pa, 0.190_295))
}

/// True for a pressure a working sensor could report anywhere a rocket flies.
pub fn is_plausible_pressure(pressure_pa: f64) -> bool {
    pressure_pa.is_finite() && pressure_pa > 1_000.0 && pressure_pa < 120_000.0
}

pub trait Barometer {
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Static pressure in Pa.
    fn read_pressure(&mut self) -> Result<f64, SensorError>;

    /// Absolute altitude in meters for the given sea level pressure.
    ///
    /// Sensors with an on-chip altitude computation override this.
    fn read_altitude(&mut self, sea_level_pa: f64) -> Result<f64, SensorError> {
        let pressure = self.read_pressure()?;
        if !is_plausible_pressure(pressure) {
            return Err(SensorError::InvalidReading);
        }
        Ok(pressure_to_altitude(pressure, sea_level_pa))
    }
}

pub trait Accelerometer {
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Acceleration vector in m/s², sensor frame.
    fn read_acceleration(&mut self) -> Result<[f64; 3], SensorError>;
}

/// Magnitude of an acceleration vector, optionally with 1g removed.
pub fn acceleration_magnitude(accel: [f64; 3], gravity_compensation: bool) -> f64 {
    let [x, y, z] = accel;
    let magnitude = libm::sqrt(x * x + y * y + z * z);
    if gravity_compensation {
        magnitude - STANDARD_GRAVITY
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    struct FixedBarometer(f64);

    impl Barometer for FixedBarometer {
        fn begin(&mut self) -> Result<(), SensorError> {
            Ok(())
        }
        fn read_pressure(&mut self) -> Result<f64, SensorError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_altitude_at_reference_is_zero() {
        assert_abs_diff_eq!(pressure_to_altitude(98_000.0, 98_000.0), 0.0);
    }

    #[test]
    fn test_altitude_rises_as_pressure_drops() {
        // ~12 Pa per meter near sea level.
        let alt = pressure_to_altitude(101_325.0 - 1_200.0, 101_325.0);
        assert!(alt > 95.0 && alt < 105.0, "got {alt}");
    }

    #[test]
    fn test_read_altitude_rejects_zero_pressure() {
        let mut baro = FixedBarometer(0.0);
        assert_eq!(baro.read_altitude(101_325.0), Err(SensorError::InvalidReading));
    }

    #[test]
    fn test_read_altitude_default_path() {
        let mut baro = FixedBarometer(89_875.0);
        let alt = baro.read_altitude(101_325.0).unwrap();
        assert!(alt > 1_000.0 && alt < 1_010.0, "got {alt}");
    }

    #[test]
    fn test_gravity_compensation() {
        let resting = [0.0, 0.0, STANDARD_GRAVITY];
        assert_abs_diff_eq!(acceleration_magnitude(resting, false), STANDARD_GRAVITY);
        assert_abs_diff_eq!(acceleration_magnitude(resting, true), 0.0);
        assert_abs_diff_eq!(acceleration_magnitude([3.0, 4.0, 0.0], false), 5.0);
    }
}
