//! Stepper drive pins and endstops

use kiln_hal::{InputPin, OutputPin};

use crate::config::limits::DRIVES;
use crate::sensing::EndStopHit;

/// Pins of one drive; any of them may be absent on a board
pub struct DriveIo<P, E> {
    /// Step pulse output
    pub step: Option<P>,
    /// Direction output
    pub direction: Option<P>,
    /// Driver enable output
    pub enable: Option<P>,
    /// Low-end endstop
    pub low_stop: Option<E>,
    /// High-end endstop
    pub high_stop: Option<E>,
}

impl<P, E> DriveIo<P, E> {
    /// A drive with nothing wired
    pub const fn unconnected() -> Self {
        Self {
            step: None,
            direction: None,
            enable: None,
            low_stop: None,
            high_stop: None,
        }
    }
}

/// Pin polarities of the stepper drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrivePolarity {
    /// Direction level written for forward motion, per drive
    pub forwards: [bool; DRIVES],
    /// Level on the enable pin that enables a driver
    pub enable_high: bool,
    /// Level an endstop reads when hit
    pub endstop_hit_high: bool,
}

impl Default for DrivePolarity {
    fn default() -> Self {
        Self {
            forwards: [true; DRIVES],
            enable_high: false,
            endstop_hit_high: true,
        }
    }
}

/// All stepper drives with their enable bookkeeping
pub struct Drives<P, E> {
    io: [DriveIo<P, E>; DRIVES],
    enabled: [bool; DRIVES],
    polarity: DrivePolarity,
}

impl<P: OutputPin, E: InputPin> Drives<P, E> {
    /// Take ownership of the drive pins
    pub fn new(io: [DriveIo<P, E>; DRIVES], polarity: DrivePolarity) -> Self {
        Self {
            io,
            enabled: [false; DRIVES],
            polarity,
        }
    }

    // Calls naming a drive past the last one do nothing

    /// Set the direction of the next steps
    pub fn set_direction(&mut self, drive: usize, forwards: bool) {
        let Some(&forward_level) = self.polarity.forwards.get(drive) else {
            return;
        };
        let level = if forwards { forward_level } else { !forward_level };
        if let Some(pin) = self.io.get_mut(drive).and_then(|io| io.direction.as_mut()) {
            pin.set_level(level);
        }
    }

    /// Emit one step pulse, enabling the driver first if needed
    pub fn step(&mut self, drive: usize) {
        let enable_high = self.polarity.enable_high;
        let (Some(io), Some(enabled)) = (self.io.get_mut(drive), self.enabled.get_mut(drive))
        else {
            return;
        };
        let Some(step) = io.step.as_mut() else {
            return;
        };
        if !*enabled {
            if let Some(enable) = io.enable.as_mut() {
                enable.set_level(enable_high);
                *enabled = true;
            }
        }
        step.set_low();
        step.set_high();
    }

    /// Turn the driver off
    pub fn disable(&mut self, drive: usize) {
        let enable_high = self.polarity.enable_high;
        let (Some(io), Some(enabled)) = (self.io.get_mut(drive), self.enabled.get_mut(drive))
        else {
            return;
        };
        if let Some(enable) = io.enable.as_mut() {
            enable.set_level(!enable_high);
            *enabled = false;
        }
    }

    /// Turn every driver off
    pub fn disable_all(&mut self) {
        for drive in 0..DRIVES {
            self.disable(drive);
        }
    }

    /// Whether the driver is known to be enabled
    pub fn is_enabled(&self, drive: usize) -> bool {
        self.enabled.get(drive).copied().unwrap_or(false)
    }

    /// State of the mechanical endstops of `drive`
    pub fn endstop(&self, drive: usize) -> EndStopHit {
        let hit = |pin: &E| pin.is_high() == self.polarity.endstop_hit_high;
        let Some(io) = self.io.get(drive) else {
            return EndStopHit::NoStop;
        };
        if io.low_stop.as_ref().is_some_and(hit) {
            EndStopHit::LowHit
        } else if io.high_stop.as_ref().is_some_and(hit) {
            EndStopHit::HighHit
        } else {
            EndStopHit::NoStop
        }
    }

    /// Pins of one drive
    pub fn io(&self, drive: usize) -> Option<&DriveIo<P, E>> {
        self.io.get(drive)
    }
}
