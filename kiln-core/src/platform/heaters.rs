//! Heater power outputs

use crate::config::limits::HEATERS;
use crate::traits::HeaterPwm;

/// Heater outputs with the board's drive polarity applied
///
/// Shared by reference between the acquisition interrupt and the
/// foreground.
#[derive(Debug)]
pub struct HeaterOutputs<H> {
    pwm: H,
    active_low: bool,
}

impl<H: HeaterPwm> HeaterOutputs<H> {
    /// Wrap a PWM bank
    ///
    /// # Arguments
    /// * `pwm` - Heater PWM channels
    /// * `active_low` - Whether a low output turns a heater on
    pub const fn new(pwm: H, active_low: bool) -> Self {
        Self { pwm, active_low }
    }

    /// Set `heater` to a power fraction
    ///
    /// `power` is clamped to `[0, 1]` and scaled to the 8-bit duty.
    pub fn set_power(&self, heater: usize, power: f32) {
        if heater >= HEATERS {
            return;
        }
        let power = if power > 0.0 { power.min(1.0) } else { 0.0 };
        self.write(heater, (255.0 * power) as u8);
    }

    /// Turn `heater` fully off without floating point (interrupt safe)
    pub fn cut(&self, heater: usize) {
        if heater < HEATERS {
            self.write(heater, 0);
        }
    }

    /// Turn every heater off
    pub fn all_off(&self) {
        for heater in 0..HEATERS {
            self.cut(heater);
        }
    }

    fn write(&self, heater: usize, duty: u8) {
        let duty = if self.active_low { 255 - duty } else { duty };
        self.pwm.set_duty(heater, duty);
    }

    /// Underlying PWM bank
    pub fn pwm(&self) -> &H {
        &self.pwm
    }
}
