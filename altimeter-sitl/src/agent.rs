//! Simulated vehicle and the hardware the flight core talks to.

use altimeter_core::{
    Accelerometer, Barometer, DeviceRole, SensorError, ServoAngles, SERVO_PERIOD_US,
    STANDARD_GRAVITY, servo_pulse_us,
};
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::pwm::{ErrorType as PwmErrorType, SetDutyCycle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

pub const SEA_LEVEL_PA: f64 = 101_325.0;

/// Deceleration a chute applies while slowing the vehicle to its descent rate.
pub const CHUTE_DECELERATION: f64 = 3.0 * STANDARD_GRAVITY;

/// Vehicle and motor parameters for one simulated flight.
#[derive(Clone, Copy, Debug)]
pub struct FlightProfile {
    pub pad_elevation_m: f64,
    /// Time on the pad before ignition.
    pub launch_delay_s: f64,
    /// Proper acceleration while the motor burns, m/s².
    pub boost_acceleration: f64,
    pub burn_time_s: f64,
    /// Terminal descent rates, m/s.
    pub drogue_rate: f64,
    pub main_rate: f64,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            pad_elevation_m: 250.0,
            launch_delay_s: 2.0,
            boost_acceleration: 60.0,
            burn_time_s: 2.0,
            drogue_rate: 20.0,
            main_rate: 6.0,
        }
    }
}

/// Ground truth of the simulated flight.
#[derive(Debug, Default)]
pub struct World {
    pub time_s: f64,
    /// Meters above the pad.
    pub altitude: f64,
    pub velocity: f64,
    /// What an ideal accelerometer would read along the vehicle axis.
    pub proper_acceleration: f64,
    pub apogee: f64,
    pub drogue_out: bool,
    pub main_out: bool,
    pub landed: bool,
    launched: bool,
}

pub type SharedWorld = Rc<RefCell<World>>;

impl World {
    pub fn shared() -> SharedWorld {
        Rc::new(RefCell::new(World {
            proper_acceleration: STANDARD_GRAVITY,
            ..World::default()
        }))
    }

    pub fn advance(&mut self, dt: f64, profile: &FlightProfile) {
        self.time_s += dt;
        if self.landed || self.time_s < profile.launch_delay_s {
            self.proper_acceleration = STANDARD_GRAVITY;
            return;
        }
        self.launched = true;

        let burning = self.time_s < profile.launch_delay_s + profile.burn_time_s;
        let old_velocity = self.velocity;
        let thrust = if burning {
            profile.boost_acceleration
        } else {
            0.0
        };
        self.velocity += (thrust - STANDARD_GRAVITY) * dt;

        let limit = if self.main_out {
            Some(profile.main_rate)
        } else if self.drogue_out {
            Some(profile.drogue_rate)
        } else {
            None
        };
        if let Some(rate) = limit {
            if self.velocity < -rate {
                let braked = (old_velocity + CHUTE_DECELERATION * dt).min(-rate);
                self.velocity = self.velocity.max(braked);
            }
        }

        self.altitude += self.velocity * dt;
        self.apogee = self.apogee.max(self.altitude);
        self.proper_acceleration = ((self.velocity - old_velocity) / dt + STANDARD_GRAVITY).abs();

        if self.launched && self.altitude <= 0.0 && self.velocity < 0.0 {
            self.altitude = 0.0;
            self.velocity = 0.0;
            self.proper_acceleration = STANDARD_GRAVITY;
            self.landed = true;
        }
    }

    fn deploy(&mut self, role: DeviceRole) {
        let already = match role {
            DeviceRole::Drogue => std::mem::replace(&mut self.drogue_out, true),
            DeviceRole::Main => std::mem::replace(&mut self.main_out, true),
        };
        if !already {
            log::info!(
                "[SIM] {:?} out at {:.1} m, t={:.2}s",
                role,
                self.altitude,
                self.time_s
            );
        }
    }
}

/// Pressure sensor with gaussian noise. Can be told to fail at start-up.
pub struct SimBarometer {
    world: SharedWorld,
    pad_elevation_m: f64,
    noise: Normal<f64>,
    rng: StdRng,
    alive: bool,
}

impl SimBarometer {
    pub fn new(
        world: SharedWorld,
        pad_elevation_m: f64,
        noise_pa: f64,
        seed: u64,
        alive: bool,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            world,
            pad_elevation_m,
            noise: Normal::new(0.0, noise_pa)?,
            rng: StdRng::seed_from_u64(seed),
            alive,
        })
    }
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
        let h = self.pad_elevation_m + self.world.borrow().altitude;
        let pressure = SEA_LEVEL_PA * (1.0 - h / 44_330.0).powf(1.0 / 0.190_295);
        Ok(pressure + self.noise.sample(&mut self.rng))
    }
}

/// Accelerometer aligned with the vehicle axis, with gaussian noise per axis.
pub struct SimImu {
    world: SharedWorld,
    noise: Normal<f64>,
    rng: StdRng,
    alive: bool,
}

impl SimImu {
    pub fn new(world: SharedWorld, noise: f64, seed: u64, alive: bool) -> anyhow::Result<Self> {
        Ok(Self {
            world,
            noise: Normal::new(0.0, noise)?,
            rng: StdRng::seed_from_u64(seed),
            alive,
        })
    }
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
        let axial = self.world.borrow().proper_acceleration;
        Ok([
            self.noise.sample(&mut self.rng),
            self.noise.sample(&mut self.rng),
            axial + self.noise.sample(&mut self.rng),
        ])
    }
}

/// Igniter relay: going high releases the chute.
pub struct SimPyro {
    world: SharedWorld,
    role: DeviceRole,
}

impl SimPyro {
    pub fn new(world: SharedWorld, role: DeviceRole) -> Self {
        Self { world, role }
    }
}

impl PinErrorType for SimPyro {
    type Error = Infallible;
}

impl OutputPin for SimPyro {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.world.borrow_mut().deploy(self.role);
        Ok(())
    }
}

/// Servo latch: moving to the release angle releases the chute.
pub struct SimServo {
    world: SharedWorld,
    role: DeviceRole,
    release_pulse_us: u16,
}

impl SimServo {
    pub fn new(world: SharedWorld, role: DeviceRole, angles: ServoAngles) -> Self {
        Self {
            world,
            role,
            release_pulse_us: servo_pulse_us(angles.on_angle),
        }
    }
}

impl PwmErrorType for SimServo {
    type Error = Infallible;
}

impl SetDutyCycle for SimServo {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let pulse_us = (duty as u32 * SERVO_PERIOD_US as u32 / u16::MAX as u32) as u16;
        if pulse_us.abs_diff(self.release_pulse_us) <= 2 {
            self.world.borrow_mut().deploy(self.role);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ballistic_flight_lands() {
        let world = World::shared();
        let profile = FlightProfile::default();
        for _ in 0..20_000 {
            world.borrow_mut().advance(0.01, &profile);
        }
        let w = world.borrow();
        assert!(w.landed);
        assert!(w.apogee > 500.0 && w.apogee < 700.0, "apogee {}", w.apogee);
    }

    #[test]
    fn pyro_deploys_and_slows_descent() {
        let world = World::shared();
        let profile = FlightProfile::default();
        let mut drogue = SimPyro::new(world.clone(), DeviceRole::Drogue);
        for _ in 0..1_000 {
            world.borrow_mut().advance(0.01, &profile);
        }
        drogue.set_high().unwrap();
        for _ in 0..200 {
            world.borrow_mut().advance(0.01, &profile);
        }
        let w = world.borrow();
        assert!(w.drogue_out);
        assert!(w.velocity >= -profile.drogue_rate - 1e-9);
    }

    #[test]
    fn main_opening_stays_below_boost_acceleration() {
        let world = World::shared();
        let profile = FlightProfile::default();
        let mut peak_descent = 0.0f64;
        let mut peak_acceleration = 0.0f64;
        for _ in 0..20_000 {
            let mut w = world.borrow_mut();
            w.advance(0.01, &profile);
            if w.velocity < 0.0 && !w.main_out {
                if w.altitude < 150.0 {
                    w.deploy(DeviceRole::Main);
                } else if !w.drogue_out {
                    w.deploy(DeviceRole::Drogue);
                }
            }
            if w.main_out {
                peak_descent = peak_descent.max(-w.velocity);
            }
            peak_acceleration = peak_acceleration.max(w.proper_acceleration);
        }
        let w = world.borrow();
        assert!(w.landed);
        assert!(
            peak_acceleration <= profile.boost_acceleration + 1e-6,
            "peak {peak_acceleration}"
        );
        // Main was opened during the drogue descent and slowed the vehicle.
        assert!(peak_descent > profile.main_rate);
        assert!(w.velocity.abs() < 1e-9);
    }

    #[test]
    fn servo_releases_only_at_release_angle() {
        let world = World::shared();
        let angles = ServoAngles::new(35, 178);
        let mut servo = SimServo::new(world.clone(), DeviceRole::Main, angles);
        let duty_for = |angle: u8| {
            (servo_pulse_us(angle) as u32 * u16::MAX as u32 / SERVO_PERIOD_US as u32) as u16
        };

        servo.set_duty_cycle(duty_for(178)).unwrap();
        assert!(!world.borrow().main_out);
        servo.set_duty_cycle(duty_for(35)).unwrap();
        assert!(world.borrow().main_out);
    }
}
