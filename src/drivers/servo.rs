//! Dispenser servo driver (continuous-rotation hobby servo).
//!
//! Angle → pulse width → duty cycle on any `embedded_hal::pwm::SetDutyCycle`
//! channel (an LEDC channel on the device, a recording mock in tests).
//!
//! ## Positions
//!
//! The auger servos are continuous-rotation: 0° spins the auger (dispense),
//! 90° is the neutral pulse (stop).
//!
//! ## Dual-target design
//!
//! The driver is generic over the PWM channel, so the same code runs against
//! `esp_idf_hal::ledc::LedcDriver` and host mocks.

use embedded_hal::pwm::SetDutyCycle;

use crate::error::ActuatorError;
use crate::pins;

/// Angle that spins the auger.
pub const DISPENSE_ANGLE: u8 = 0;
/// Neutral pulse: auger at rest.
pub const STOP_ANGLE: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoState {
    Stopped,
    Dispensing,
}

pub struct ServoDriver<P> {
    pwm: P,
    state: ServoState,
    angle: u8,
}

impl<P: SetDutyCycle> ServoDriver<P> {
    /// Wrap a 50 Hz PWM channel.  Does not move the servo.
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            state: ServoState::Stopped,
            angle: STOP_ANGLE,
        }
    }

    /// Start the auger.
    pub fn open(&mut self) -> Result<(), ActuatorError> {
        self.write_angle(DISPENSE_ANGLE)?;
        self.state = ServoState::Dispensing;
        Ok(())
    }

    /// Stop the auger.
    pub fn close(&mut self) -> Result<(), ActuatorError> {
        self.write_angle(STOP_ANGLE)?;
        self.state = ServoState::Stopped;
        Ok(())
    }

    /// Drive to `angle` degrees (clamped to 0–180).
    pub fn write_angle(&mut self, angle: u8) -> Result<(), ActuatorError> {
        let angle = angle.min(180);
        let duty = duty_for_angle(angle, self.pwm.max_duty_cycle());
        self.pwm
            .set_duty_cycle(duty)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.angle = angle;
        Ok(())
    }

    pub fn state(&self) -> ServoState {
        self.state
    }

    pub fn angle(&self) -> u8 {
        self.angle
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

/// Pulse width in microseconds for `angle` (0–180°).
pub fn pulse_us_for_angle(angle: u8) -> u32 {
    let span = pins::SERVO_MAX_PULSE_US - pins::SERVO_MIN_PULSE_US;
    pins::SERVO_MIN_PULSE_US + span * u32::from(angle.min(180)) / 180
}

/// Duty value for `angle` given the channel's full-scale duty.
pub fn duty_for_angle(angle: u8, max_duty: u16) -> u16 {
    let period_us = 1_000_000 / pins::SERVO_PWM_FREQ_HZ;
    (u32::from(max_duty) * pulse_us_for_angle(angle) / period_us) as u16
}
