//! Actuation controller: turns `(bowl, grams)` into a timed servo cycle.
//!
//! ```text
//!  dispense(bowl, grams)
//!     │
//!     ├─ bowl unknown? ──▶ UnknownBowl (logged, nothing moves)
//!     │
//!     ├─ servo[bowl].open()          auger spinning
//!     ├─ delay(grams × ms_per_gram)  ◀── blocks the whole control loop
//!     └─ servo[bowl].close()         auger at rest
//! ```
//!
//! There is no feedback: the hold time is an open-loop proxy for mass.
//! `dispense` takes `&mut self`, so two cycles can never overlap.

use embedded_hal::delay::DelayNs;
use embedded_hal::pwm::SetDutyCycle;
use heapless::Vec;
use log::{info, warn};

use crate::drivers::servo::ServoDriver;
use crate::error::Error;

/// Upper bound on physical bowls.
pub const MAX_BOWLS: usize = 4;

/// What a dispense request resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispenseOutcome {
    /// The servo ran for `duration_ms`.
    Dispensed { bowl: u32, grams: u32, duration_ms: u32 },
    /// No servo is mapped to this bowl number.  Nothing moved.
    UnknownBowl(u32),
}

pub struct ActuationController<P, D> {
    servos: Vec<ServoDriver<P>, MAX_BOWLS>,
    delay: D,
    ms_per_gram: u32,
    dispense_count: u32,
}

impl<P: SetDutyCycle, D: DelayNs> ActuationController<P, D> {
    /// Bowl `n` is driven by the `n`-th channel (1-based).  Channels beyond
    /// [`MAX_BOWLS`] are ignored.
    pub fn new(channels: impl IntoIterator<Item = P>, delay: D, ms_per_gram: u32) -> Self {
        let mut servos = Vec::new();
        for pwm in channels {
            if servos.push(ServoDriver::new(pwm)).is_err() {
                warn!("Actuation: more than {} servos supplied, extra ignored", MAX_BOWLS);
                break;
            }
        }
        Self {
            servos,
            delay,
            ms_per_gram,
            dispense_count: 0,
        }
    }

    /// Put every servo in the stop position.  Call once at boot.
    pub fn park_all(&mut self) -> Result<(), Error> {
        for servo in &mut self.servos {
            servo.close()?;
        }
        Ok(())
    }

    /// Hold time for `grams`.
    pub fn duration_ms(&self, grams: u32) -> u32 {
        grams.saturating_mul(self.ms_per_gram)
    }

    /// Run one blocking dispense cycle.
    pub fn dispense(&mut self, bowl: u32, grams: u32) -> Result<DispenseOutcome, Error> {
        let duration_ms = self.duration_ms(grams);
        let Some(servo) = bowl
            .checked_sub(1)
            .and_then(|idx| self.servos.get_mut(idx as usize))
        else {
            warn!("Actuation: no servo for bowl {}, request dropped", bowl);
            return Ok(DispenseOutcome::UnknownBowl(bowl));
        };

        info!("Actuation: bowl {} dispensing {} g ({} ms)", bowl, grams, duration_ms);
        if let Err(e) = servo.open() {
            // Best effort: never leave an auger spinning.
            let _ = servo.close();
            return Err(e.into());
        }
        self.delay.delay_ms(duration_ms);
        servo.close()?;

        self.dispense_count = self.dispense_count.wrapping_add(1);
        Ok(DispenseOutcome::Dispensed {
            bowl,
            grams,
            duration_ms,
        })
    }

    pub fn bowl_count(&self) -> usize {
        self.servos.len()
    }

    pub fn dispense_count(&self) -> u32 {
        self.dispense_count
    }

    pub fn servo(&self, bowl: u32) -> Option<&ServoDriver<P>> {
        self.servos.get(bowl.checked_sub(1)? as usize)
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }
}
