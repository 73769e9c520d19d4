//! Heater output trait

/// PWM outputs driving the heater MOSFETs
///
/// Takes `&self` because both the acquisition interrupt (safety cutoff) and
/// the foreground (temperature control) write duties. Implementations must
/// make a single write atomic with respect to interrupts, which a PWM
/// compare register store is.
pub trait HeaterPwm {
    /// Number of heater channels wired on the board
    fn channels(&self) -> usize;

    /// Write the raw 8-bit duty for `heater`
    ///
    /// Channels the board does not have are ignored.
    fn set_duty(&self, heater: usize, duty: u8);
}
