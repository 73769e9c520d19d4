//! Digital potentiometer trait
//!
//! Stepper driver current references are set by digipot wipers.

/// Multi-wiper digital potentiometer with volatile and non-volatile wipers
pub trait DigitalPot {
    /// Bus or device error
    type Error;

    /// Set the volatile (active) wiper position
    fn set_volatile_wiper(&mut self, wiper: u8, value: u16) -> Result<(), Self::Error>;

    /// Set the non-volatile (power-on) wiper position
    fn set_non_volatile_wiper(&mut self, wiper: u8, value: u16) -> Result<(), Self::Error>;

    /// Read back the non-volatile wiper position
    fn non_volatile_wiper(&mut self, wiper: u8) -> Result<u16, Self::Error>;
}
