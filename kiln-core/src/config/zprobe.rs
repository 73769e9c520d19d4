//! Z-probe selection and calibration

use serde::{Deserialize, Serialize};

/// Trigger height used for the analog probe factory parameters (mm)
pub const Z_PROBE_STOP_HEIGHT: f32 = 0.7;

/// Factory ADC trigger threshold
pub const Z_PROBE_AD_VALUE: i32 = 400;

/// Kind of Z probe fitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ZProbeType {
    /// Z endstop switch, no analog probe
    Switch = 0,
    /// Unmodulated IR or ultrasonic sensor
    Simple = 1,
    /// Modulated IR sensor, emitter toggled each cycle
    Modulated = 2,
    /// Alternate analog sensor, emitter held off
    Alternate = 3,
}

impl ZProbeType {
    /// Decode a stored or requested selector; out-of-range values mean
    /// [`ZProbeType::Switch`]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ZProbeType::Simple,
            2 => ZProbeType::Modulated,
            3 => ZProbeType::Alternate,
            _ => ZProbeType::Switch,
        }
    }

    /// Numeric selector as used on the wire and in G-code
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether an analog probe is in use
    pub fn is_analog(self) -> bool {
        self != ZProbeType::Switch
    }
}

/// Calibration of one Z-probe parameter set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ZProbeParameters {
    /// Reading at which the probe counts as triggered
    pub adc_value: i32,
    /// Probe X offset from the nozzle (mm)
    pub x_offset: f32,
    /// Probe Y offset from the nozzle (mm)
    pub y_offset: f32,
    /// Nozzle height when the probe triggers (mm)
    pub height: f32,
    /// Bed temperature at which `height` was measured (°C)
    pub calib_temperature: f32,
    /// Trigger height change per °C away from `calib_temperature`
    pub temperature_coefficient: f32,
}

impl ZProbeParameters {
    /// Factory parameters with the given trigger height
    pub const fn new(height: f32) -> Self {
        Self {
            adc_value: Z_PROBE_AD_VALUE,
            x_offset: 0.0,
            y_offset: 0.0,
            height,
            calib_temperature: 20.0,
            temperature_coefficient: 0.0,
        }
    }

    /// Trigger height corrected for the current bed temperature
    pub fn stop_height(&self, temperature: f32) -> f32 {
        (temperature - self.calib_temperature) * self.temperature_coefficient + self.height
    }
}

impl Default for ZProbeParameters {
    fn default() -> Self {
        Self::new(Z_PROBE_STOP_HEIGHT)
    }
}
