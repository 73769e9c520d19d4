//! Periodic tick timer
//!
//! Drives the acquisition interrupt. The core only ever changes its period.

/// Hardware timer that fires the acquisition tick
pub trait TickTimer {
    /// Set the interval between ticks in microseconds
    ///
    /// A period of zero is never requested.
    fn set_period_us(&mut self, period_us: u32);
}
