//! Stepper motor current through digital potentiometers
//!
//! The first [`MAIN_POT_DRIVES`] drives take their current reference from
//! the main board's digipot, the rest from the expansion board's.

use crate::config::limits::{DRIVES, MAIN_POT_DRIVES};
use crate::traits::DigitalPot;

/// Current sense wiring of the stepper drivers
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSense {
    /// Digipot wiper feeding each drive
    pub wipers: [u8; DRIVES],
    /// Sense resistor in ohms
    pub sense_resistor: f32,
    /// Digipot output voltage at full scale
    pub max_digipot_voltage: f32,
}

impl Default for CurrentSense {
    fn default() -> Self {
        Self {
            wipers: [1, 3, 2, 0, 1, 3, 2, 0],
            sense_resistor: 0.1,
            max_digipot_voltage: 3.3 * 2.5 / (2.7 + 2.5),
        }
    }
}

impl CurrentSense {
    /// Wiper position for a current in mA
    pub fn pot_value(&self, current: f32) -> u16 {
        (0.256 * current * 8.0 * self.sense_resistor / self.max_digipot_voltage) as u16
    }

    /// Current in mA for a wiper position
    pub fn current(&self, pot: u16) -> f32 {
        pot as f32 * self.max_digipot_voltage / (0.256 * 8.0 * self.sense_resistor)
    }
}

/// Main and expansion digipots with the drive-to-wiper map
pub struct MotorCurrents<P> {
    main: P,
    expansion: P,
    sense: CurrentSense,
}

impl<P: DigitalPot> MotorCurrents<P> {
    /// Wrap both digipots
    pub fn new(main: P, expansion: P, sense: CurrentSense) -> Self {
        Self {
            main,
            expansion,
            sense,
        }
    }

    fn pot_for(&mut self, drive: usize) -> &mut P {
        if drive < MAIN_POT_DRIVES {
            &mut self.main
        } else {
            &mut self.expansion
        }
    }

    /// Set the current of `drive` in mA, both for now and after power-up
    pub fn set(&mut self, drive: usize, current: f32) -> Result<(), P::Error> {
        let pot = self.sense.pot_value(current);
        let wiper = self.sense.wipers[drive];
        let device = self.pot_for(drive);
        device.set_non_volatile_wiper(wiper, pot)?;
        device.set_volatile_wiper(wiper, pot)
    }

    /// Power-up current of `drive` in mA
    pub fn get(&mut self, drive: usize) -> Result<f32, P::Error> {
        let wiper = self.sense.wipers[drive];
        let pot = self.pot_for(drive).non_volatile_wiper(wiper)?;
        Ok(self.sense.current(pot))
    }

    /// Main board digipot
    pub fn main(&self) -> &P {
        &self.main
    }

    /// Expansion board digipot
    pub fn expansion(&self) -> &P {
        &self.expansion
    }
}
