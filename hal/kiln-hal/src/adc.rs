//! Analog-to-digital converter abstraction
//!
//! The acquisition state machine overlaps conversions with interrupt
//! latency: it starts a conversion on one tick and harvests it on the next.
//! A converter therefore exposes the start and the read separately.

/// Split-phase ADC
pub trait AdcConverter {
    /// Channel identifier (pin or mux index)
    type Channel: Copy;

    /// Begin a conversion on `channel`
    ///
    /// Must return immediately; the result is collected with
    /// [`AdcConverter::read_result`] on a later call.
    fn start_conversion(&mut self, channel: Self::Channel);

    /// Fetch the most recent conversion result for `channel`
    ///
    /// Returns a right-aligned 12-bit value.
    fn read_result(&mut self, channel: Self::Channel) -> u16;

    /// Start a conversion and wait for its result
    ///
    /// Used outside interrupt context (diagnostics, bring-up).
    fn read_blocking(&mut self, channel: Self::Channel) -> u16 {
        self.start_conversion(channel);
        self.read_result(channel)
    }
}
