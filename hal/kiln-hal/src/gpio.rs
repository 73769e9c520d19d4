//! GPIO pin abstractions
//!
//! Step, direction, enable, ATX power and probe modulation lines
//! are plain push-pull outputs; endstops are plain inputs. Board crates map
//! these onto their chip's pin drivers.

/// Digital output pin
///
/// Writes are infallible: on the supported MCUs a GPIO write is a single
/// register store.
pub trait OutputPin {
    /// Drive the pin high (logic 1)
    fn set_high(&mut self);

    /// Drive the pin low (logic 0)
    fn set_low(&mut self);

    /// Drive the pin to the given level
    fn set_level(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Last level written to the pin
    fn is_set_high(&self) -> bool;
}

/// Digital input pin
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}
