//! Per-heater control and thermistor parameters
//!
//! The thermistor is modelled with the Beta equation
//! `R(T) = R∞ · exp(β / T)` (T in kelvin), read through a potential divider
//! with a series resistor to the ADC reference.

use serde::{Deserialize, Serialize};

use super::limits::{
    ABS_ZERO, AD_DISCONNECTED_VIRTUAL, AD_RANGE_REAL, AD_RANGE_VIRTUAL, HEATERS,
    SHORTED_TEMPERATURE,
};

/// Reference temperature for R25 (°C)
const R25_TEMPERATURE: f32 = 25.0;

/// PID gains and thermistor model for one heater
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidParameters {
    /// Proportional gain; negative selects bang-bang control
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
    /// Feed-forward temperature gain
    pub kt: f32,
    /// PWM scale factor
    pub ks: f32,
    /// Error band outside which full power is applied
    pub full_band: f32,
    /// Lower clamp of the PID output
    pub pid_min: f32,
    /// Upper clamp of the PID output
    pub pid_max: f32,
    /// Thermistor Beta coefficient (K)
    pub thermistor_beta: f32,
    /// Thermistor R∞ (Ω), derived from R25 and Beta
    pub thermistor_inf_r: f32,
    /// Series resistor of the divider (Ω)
    pub thermistor_series_r: f32,
    /// ADC correction at the bottom of the range
    pub adc_low_offset: f32,
    /// ADC correction at the top of the range
    pub adc_high_offset: f32,
}

impl PidParameters {
    /// Factory parameters for a heater
    ///
    /// Heater 0 is the bed (10k thermistor, bang-bang); the others are hot
    /// ends (100k thermistor, PID).
    pub fn default_for(heater: usize) -> Self {
        let mut params = if heater == 0 {
            Self {
                kp: -1.0,
                ki: 0.0,
                kd: 0.0,
                kt: 0.0,
                ks: 1.0,
                full_band: 5.0,
                pid_min: 0.0,
                pid_max: 255.0,
                thermistor_beta: 0.0,
                thermistor_inf_r: 0.0,
                thermistor_series_r: 4700.0,
                adc_low_offset: 0.0,
                adc_high_offset: 0.0,
            }
        } else {
            Self {
                kp: 10.0,
                ki: 0.1,
                kd: 100.0,
                kt: 0.4,
                ks: 1.0,
                full_band: 20.0,
                pid_min: 0.0,
                pid_max: 255.0,
                thermistor_beta: 0.0,
                thermistor_inf_r: 0.0,
                thermistor_series_r: 4700.0,
                adc_low_offset: 0.0,
                adc_high_offset: 0.0,
            }
        };
        if heater == 0 {
            params.set_thermistor_r25_and_beta(10_000.0, 3988.0);
        } else {
            params.set_thermistor_r25_and_beta(100_000.0, 4138.0);
        }
        params
    }

    /// Whether PID (rather than bang-bang) control is selected
    pub fn use_pid(&self) -> bool {
        self.kp >= 0.0
    }

    /// Thermistor resistance at 25 °C
    pub fn thermistor_r25(&self) -> f32 {
        self.thermistor_inf_r * libm::expf(self.thermistor_beta / (R25_TEMPERATURE - ABS_ZERO))
    }

    /// Set the thermistor model from its R25 and Beta
    pub fn set_thermistor_r25_and_beta(&mut self, r25: f32, beta: f32) {
        self.thermistor_inf_r = r25 * libm::expf(-beta / (R25_TEMPERATURE - ABS_ZERO));
        self.thermistor_beta = beta;
    }

    /// Thermistor resistance at `temperature` (°C)
    pub fn resistance_at(&self, temperature: f32) -> f32 {
        self.thermistor_inf_r * libm::expf(self.thermistor_beta / (temperature - ABS_ZERO))
    }

    /// Filter sum below which the heater counts as overheated
    ///
    /// The thermistor resistance at `temperature` is turned into the raw ADC
    /// reading it produces, rounded up, and scaled by the averaging depth.
    pub fn overheat_sum(&self, temperature: f32, readings_averaged: usize) -> u32 {
        let resistance = self.resistance_at(temperature);
        let adc = (AD_RANGE_REAL as f32 + 1.0) * resistance
            / (resistance + self.thermistor_series_r);
        (adc + 0.9) as u32 * readings_averaged as u32
    }

    /// Convert an averaged raw reading into °C
    ///
    /// Returns [`ABS_ZERO`] for a disconnected thermistor and
    /// [`SHORTED_TEMPERATURE`] for a shorted one.
    pub fn temperature_from_raw(&self, raw: u32) -> f32 {
        // Offset the reading by half an ADC step to compensate for truncation
        let mut reading = raw as f32 + 0.5;

        let mut raw = raw as i64;
        if self.adc_high_offset < 0.0 {
            raw -= self.adc_high_offset as i64;
        }
        if raw >= AD_DISCONNECTED_VIRTUAL as i64 {
            return ABS_ZERO;
        }

        let range = AD_RANGE_VIRTUAL as f32 + 1.0;
        reading -= self.adc_low_offset;
        reading *= range / (range + self.adc_high_offset - self.adc_low_offset);
        let resistance = reading * self.thermistor_series_r / (range - reading);
        if resistance <= self.thermistor_inf_r {
            SHORTED_TEMPERATURE
        } else {
            ABS_ZERO + self.thermistor_beta / libm::logf(resistance / self.thermistor_inf_r)
        }
    }
}

/// Factory parameters for every heater
pub fn default_pid_parameters() -> [PidParameters; HEATERS] {
    core::array::from_fn(PidParameters::default_for)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::limits::{BAD_HIGH_TEMPERATURE, THERMISTOR_AVERAGE};

    fn approx(a: f32, b: f32, tolerance: f32) -> bool {
        (a - b).abs() <= tolerance
    }

    #[test]
    fn test_r25_round_trip() {
        let mut params = PidParameters::default_for(1);
        params.set_thermistor_r25_and_beta(100_000.0, 3950.0);
        assert!(approx(params.thermistor_r25(), 100_000.0, 1.0));
        assert_eq!(params.thermistor_beta, 3950.0);
    }

    #[test]
    fn test_use_pid() {
        assert!(!PidParameters::default_for(0).use_pid());
        assert!(PidParameters::default_for(1).use_pid());
    }

    #[test]
    fn test_temperature_at_r25() {
        let params = PidParameters::default_for(1);
        // Divider output at 100k thermistor, 4.7k series: 4096 * 100 / 104.7
        let raw = (4096.0 * 100_000.0 / 104_700.0) as u32;
        let t = params.temperature_from_raw(raw);
        assert!(approx(t, 25.0, 0.5), "got {}", t);
    }

    #[test]
    fn test_disconnected_reads_abs_zero() {
        let params = PidParameters::default_for(1);
        assert_eq!(params.temperature_from_raw(AD_DISCONNECTED_VIRTUAL as u32), ABS_ZERO);
        assert_eq!(params.temperature_from_raw(AD_RANGE_VIRTUAL as u32), ABS_ZERO);
    }

    #[test]
    fn test_shorted_reads_high() {
        // A bottom-of-range reading on the stock model is merely very hot
        let params = PidParameters::default_for(1);
        let t = params.temperature_from_raw(0);
        assert!(t > 1000.0 && t != SHORTED_TEMPERATURE, "got {}", t);

        // Divider resistance at or below R-infinity reads as a short
        let mut params = PidParameters::default_for(1);
        params.thermistor_inf_r = 1.0;
        assert_eq!(params.temperature_from_raw(0), SHORTED_TEMPERATURE);
        assert!(params.temperature_from_raw(2000) < SHORTED_TEMPERATURE);
    }

    #[test]
    fn test_overheat_sum_matches_model() {
        let params = PidParameters::default_for(1);
        let sum = params.overheat_sum(BAD_HIGH_TEMPERATURE, THERMISTOR_AVERAGE);
        assert_eq!(sum % THERMISTOR_AVERAGE as u32, 0);

        // Just above the threshold reading is below the cutoff temperature
        let raw = sum / THERMISTOR_AVERAGE as u32;
        let t = params.temperature_from_raw(raw);
        assert!(t < BAD_HIGH_TEMPERATURE + 2.0, "got {}", t);
        assert!(t > BAD_HIGH_TEMPERATURE - 10.0, "got {}", t);
    }

    #[test]
    fn test_high_offset_shifts_disconnect() {
        let mut params = PidParameters::default_for(1);
        params.adc_high_offset = -10.0;
        // raw + 10 crosses the disconnect limit
        assert_eq!(
            params.temperature_from_raw(AD_DISCONNECTED_VIRTUAL as u32 - 5),
            ABS_ZERO
        );
    }
}
