//! Cooling fan output and tachometer

use embassy_time::Instant;
use embedded_hal::pwm::SetDutyCycle;
use portable_atomic::{AtomicU32, Ordering};

use crate::config::limits::{FAN_MAX_INTERRUPT_COUNT, FAN_READING_TIMEOUT_US};

/// Fan tachometer fed from the falling-edge interrupt
///
/// The interrupt is the only writer. Every [`FAN_MAX_INTERRUPT_COUNT`]
/// pulses it records how long they took; the foreground turns that interval
/// into a speed. Times are microsecond counters that may wrap.
#[derive(Debug)]
pub struct FanTacho {
    pulses: AtomicU32,
    last_reset_us: AtomicU32,
    interval_us: AtomicU32,
}

impl FanTacho {
    /// No reading yet
    pub const fn new() -> Self {
        Self {
            pulses: AtomicU32::new(0),
            last_reset_us: AtomicU32::new(0),
            interval_us: AtomicU32::new(0),
        }
    }

    /// Count one tacho pulse seen at `now_us`
    pub fn on_pulse(&self, now_us: u32) {
        let pulses = self.pulses.load(Ordering::Relaxed) + 1;
        if pulses == FAN_MAX_INTERRUPT_COUNT {
            let last = self.last_reset_us.load(Ordering::Relaxed);
            self.interval_us.store(now_us.wrapping_sub(last), Ordering::Release);
            self.last_reset_us.store(now_us, Ordering::Release);
            self.pulses.store(0, Ordering::Relaxed);
        } else {
            self.pulses.store(pulses, Ordering::Relaxed);
        }
    }

    /// Count one tacho pulse at the current time
    pub fn pulse(&self) {
        self.on_pulse(Instant::now().as_micros() as u32);
    }

    /// Fan speed in revolutions per minute as of `now_us`
    ///
    /// Two pulses per revolution. A stopped fan produces no pulses, so a
    /// reading older than three seconds counts as zero.
    pub fn rpm(&self, now_us: u32) -> f32 {
        let interval = self.interval_us.load(Ordering::Acquire);
        let age = now_us.wrapping_sub(self.last_reset_us.load(Ordering::Acquire));
        if interval == 0 || age >= FAN_READING_TIMEOUT_US {
            return 0.0;
        }
        ((30_000_000u64 * FAN_MAX_INTERRUPT_COUNT as u64) / interval as u64) as f32
    }
}

impl Default for FanTacho {
    fn default() -> Self {
        Self::new()
    }
}

/// Duty byte for a fan speed
///
/// Speeds up to 1.0 are fractions; larger values are the old 0-255 scale.
pub fn fan_duty(speed: f32) -> u8 {
    if speed <= 1.0 {
        (255.0 * speed.max(0.0)) as u8
    } else {
        speed as u8
    }
}

/// Cooling fan PWM output
pub struct CoolingFan<F> {
    pwm: F,
    inverted: bool,
}

impl<F: SetDutyCycle> CoolingFan<F> {
    /// Wrap a PWM channel; `inverted` boards turn the fan on with a low output
    pub fn new(pwm: F, inverted: bool) -> Self {
        Self { pwm, inverted }
    }

    /// Set the speed as a fraction, or a legacy 0-255 value
    pub fn set_speed(&mut self, speed: f32) -> Result<(), F::Error> {
        let duty = fan_duty(speed);
        let duty = if self.inverted { 255 - duty } else { duty };
        self.pwm.set_duty_cycle_fraction(duty as u16, 255)
    }

    /// Underlying PWM channel
    pub fn pwm(&self) -> &F {
        &self.pwm
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::convert::Infallible;

    /// PWM channel with a 0-255 range remembering the last duty
    pub(crate) struct FakeFanPwm {
        pub duty: u16,
    }

    impl embedded_hal::pwm::ErrorType for FakeFanPwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for FakeFanPwm {
        fn max_duty_cycle(&self) -> u16 {
            255
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.duty = duty;
            Ok(())
        }
    }

    #[test]
    fn test_fan_duty_scales() {
        assert_eq!(fan_duty(0.0), 0);
        assert_eq!(fan_duty(0.5), 127);
        assert_eq!(fan_duty(1.0), 255);
        assert_eq!(fan_duty(-2.0), 0);
        // Legacy byte scale
        assert_eq!(fan_duty(128.0), 128);
        assert_eq!(fan_duty(255.0), 255);
    }

    #[test]
    fn test_inverted_fan() {
        let mut fan = CoolingFan::new(FakeFanPwm { duty: 7 }, true);
        fan.set_speed(0.0).unwrap();
        assert_eq!(fan.pwm().duty, 255);
        fan.set_speed(200.0).unwrap();
        assert_eq!(fan.pwm().duty, 55);
    }

    #[test]
    fn test_rpm_from_pulse_interval() {
        let tacho = FanTacho::new();
        assert_eq!(tacho.rpm(0), 0.0);

        // Two windows of 32 pulses, 5 ms apart: 100 rev/s
        let mut now = 1_000_000;
        for _ in 0..2 * FAN_MAX_INTERRUPT_COUNT {
            now += 5_000;
            tacho.on_pulse(now);
        }
        assert_eq!(tacho.rpm(now + 10), 6_000.0);
    }

    #[test]
    fn test_stale_reading_is_zero() {
        let tacho = FanTacho::new();
        for i in 1..=FAN_MAX_INTERRUPT_COUNT {
            tacho.on_pulse(i * 1_000);
        }
        let last = FAN_MAX_INTERRUPT_COUNT * 1_000;
        assert!(tacho.rpm(last + 1) > 0.0);
        assert_eq!(tacho.rpm(last + FAN_READING_TIMEOUT_US), 0.0);
    }
}
