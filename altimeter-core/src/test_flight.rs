// test_flight.rs
use crate::types::{FlightMillis, SensorSample};

/// Peak of the synthetic flight, meters above the pad.
pub const TEST_APOGEE_M: f64 = 400.0;
/// Climb per tick.
pub const TEST_ASCENT_STEP_M: f64 = 5.0;
/// Sink per tick after apogee.
pub const TEST_DESCENT_STEP_M: f64 = 2.0;
pub const TEST_ACCELERATION: f64 = 4.0;

/// Synthetic sensor input for a bench check of the whole phase sequence.
///
/// Starts on the pad, climbs a fixed step per tick to [`TEST_APOGEE_M`], then
/// sinks a smaller step per tick until the controller lands.
#[derive(Clone, Debug)]
pub struct TestFlight {
    altitude: f64,
    ascending: bool,
    started: bool,
    last_timestamp_ms: Option<FlightMillis>,
}

impl Default for TestFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFlight {
    pub const fn new() -> Self {
        Self {
            altitude: 0.0,
            ascending: true,
            started: false,
            last_timestamp_ms: None,
        }
    }

    pub fn next_sample(&mut self, timestamp_ms: FlightMillis) -> SensorSample {
        let step = if !self.started {
            self.started = true;
            0.0
        } else {
            if self.altitude >= TEST_APOGEE_M {
                self.ascending = false;
            }
            let step = if self.ascending {
                TEST_ASCENT_STEP_M
            } else {
                -TEST_DESCENT_STEP_M
            };
            self.altitude += step;
            step
        };

        let vertical_velocity = match self.last_timestamp_ms {
            Some(last) if timestamp_ms > last => step * 1_000.0 / (timestamp_ms - last) as f64,
            _ => 0.0,
        };
        self.last_timestamp_ms = Some(timestamp_ms);

        SensorSample {
            timestamp_ms,
            altitude: self.altitude,
            vertical_velocity,
            acceleration: TEST_ACCELERATION,
        }
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_profile_shape() {
        let mut flight = TestFlight::new();
        let first = flight.next_sample(0);
        assert_abs_diff_eq!(first.altitude, 0.0);
        assert_abs_diff_eq!(first.acceleration, TEST_ACCELERATION);

        let second = flight.next_sample(50);
        assert_abs_diff_eq!(second.altitude, 5.0);
        assert_abs_diff_eq!(second.vertical_velocity, 100.0);

        let mut peak: f64 = 0.0;
        let mut t = 100;
        while flight.altitude() >= peak {
            peak = flight.altitude();
            flight.next_sample(t);
            t += 50;
        }
        assert_abs_diff_eq!(peak, TEST_APOGEE_M);
        assert_abs_diff_eq!(flight.altitude(), TEST_APOGEE_M - TEST_DESCENT_STEP_M);
    }
}
