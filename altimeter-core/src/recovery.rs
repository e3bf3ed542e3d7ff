// recovery.rs
use crate::config::{MAX_SERVO_ANGLE, ServoAngles};
use crate::types::FlightMillis;
use crate::{debug, warn};
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

/// Servo frame period at 50 Hz.
pub const SERVO_PERIOD_US: u16 = 20_000;
/// Pulse widths for 0° and 180°, matching common hobby servos.
pub const SERVO_MIN_PULSE_US: u16 = 544;
pub const SERVO_MAX_PULSE_US: u16 = 2_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceKind {
    Pyro,
    Servo,
    NoEjection,
}

/// Commanded output state, tracked apart from the hardware registers so an
/// identical command is never re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    Off,
    On,
}

/// The hardware behind a recovery channel, fixed at construction.
pub enum Actuator<P, S> {
    /// Igniter relay on a digital output. Must not stay energized.
    Pyro(P),
    /// Mechanical release; holds its position indefinitely.
    Servo { driver: S, angles: ServoAngles },
    NoEjection,
}

impl<P, S> Actuator<P, S> {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Actuator::Pyro(_) => DeviceKind::Pyro,
            Actuator::Servo { .. } => DeviceKind::Servo,
            Actuator::NoEjection => DeviceKind::NoEjection,
        }
    }
}

/// Pulse width in microseconds for a servo angle (clamped to 0..=180°).
pub fn servo_pulse_us(angle: u8) -> u16 {
    let angle = angle.min(MAX_SERVO_ANGLE) as u32;
    let span = (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) as u32;
    SERVO_MIN_PULSE_US + (angle * span / MAX_SERVO_ANGLE as u32) as u16
}

/// One actuation channel: a drogue or main release.
pub struct RecoveryDevice<P, S> {
    id: u8,
    actuator: Actuator<P, S>,
    state: DeviceState,
    deployed: bool,
    deployment_time_ms: FlightMillis,
    timed_reset: bool,
}

impl<P, S> RecoveryDevice<P, S>
where
    P: OutputPin,
    S: SetDutyCycle,
{
    pub fn new(id: u8, actuator: Actuator<P, S>) -> Self {
        let mut device = Self {
            id,
            actuator,
            state: DeviceState::Off,
            deployed: false,
            deployment_time_ms: 0,
            timed_reset: false,
        };
        device.reset();
        device
    }

    pub fn pyro(id: u8, pin: P) -> Self {
        Self::new(id, Actuator::Pyro(pin))
    }

    pub fn servo(id: u8, driver: S, angles: ServoAngles) -> Self {
        Self::new(id, Actuator::Servo { driver, angles })
    }

    pub fn no_ejection(id: u8) -> Self {
        Self::new(id, Actuator::NoEjection)
    }

    /// Fires the channel. Returns false (and touches nothing) if it is
    /// already on.
    pub fn enable(&mut self, now_ms: FlightMillis) -> bool {
        if self.state == DeviceState::On {
            return false;
        }
        self.deployed = true;
        self.deployment_time_ms = now_ms;
        self.state = DeviceState::On;
        self.drive(DeviceState::On);
        debug!("Recovery device {} enabled", self.id);
        true
    }

    /// Returns the channel to its safe output. Returns false if it is
    /// already off. `deployed` stays latched until the next reset.
    pub fn disable(&mut self) -> bool {
        if self.state == DeviceState::Off {
            return false;
        }
        self.state = DeviceState::Off;
        self.drive(DeviceState::Off);
        debug!("Recovery device {} disabled", self.id);
        true
    }

    /// Forces the hardware to the safe position and clears all deployment
    /// bookkeeping. Runs on every arm.
    pub fn reset(&mut self) {
        self.state = DeviceState::Off;
        self.drive(DeviceState::Off);
        self.deployed = false;
        self.deployment_time_ms = 0;
        self.timed_reset = false;
    }

    /// True when a pyro channel has been energized for longer than
    /// `max_fire_ms` and has not already been tripped this arm cycle.
    pub fn fire_time_exceeded(&self, now_ms: FlightMillis, max_fire_ms: u64) -> bool {
        self.kind() == DeviceKind::Pyro
            && self.state == DeviceState::On
            && self.deployed
            && !self.timed_reset
            && now_ms.saturating_sub(self.deployment_time_ms) > max_fire_ms
    }

    /// Replaces the release positions of a servo channel. Takes effect on the
    /// next output write; ignored for other kinds.
    pub fn set_servo_angles(&mut self, new_angles: ServoAngles) {
        if let Actuator::Servo { angles, .. } = &mut self.actuator {
            *angles = new_angles;
        }
    }

    /// Safety trip: switches the channel off and latches `timed_reset`.
    pub fn trip_timeout(&mut self) {
        self.disable();
        self.timed_reset = true;
        warn!("Recovery device {} timed out", self.id);
    }

    fn drive(&mut self, state: DeviceState) {
        let on = state == DeviceState::On;
        let written = match &mut self.actuator {
            Actuator::Pyro(pin) => {
                if on {
                    pin.set_high().is_ok()
                } else {
                    pin.set_low().is_ok()
                }
            }
            Actuator::Servo { driver, angles } => {
                let angle = if on { angles.on_angle } else { angles.off_angle };
                driver
                    .set_duty_cycle_fraction(servo_pulse_us(angle), SERVO_PERIOD_US)
                    .is_ok()
            }
            Actuator::NoEjection => true,
        };
        if !written {
            warn!("Recovery device {} output write failed", self.id);
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.actuator.kind()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed
    }

    pub fn deployment_time_ms(&self) -> FlightMillis {
        self.deployment_time_ms
    }

    pub fn timed_reset(&self) -> bool {
        self.timed_reset
    }

    pub fn actuator(&self) -> &Actuator<P, S> {
        &self.actuator
    }
}
