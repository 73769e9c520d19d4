//! Raw character interface
//!
//! The USB CDC port and the auxiliary UART both look the same to the line
//! transport: a receive FIFO that can be polled and a transmit path that
//! reports how much it can accept without blocking.

/// Non-blocking byte-oriented serial interface
///
/// None of these methods may block except [`CharIo::flush`].
pub trait CharIo {
    /// Number of received bytes that can be read immediately
    fn available(&self) -> usize;

    /// Read one received byte, if any
    fn read(&mut self) -> Option<u8>;

    /// Number of bytes the transmitter accepts without blocking
    fn can_write(&self) -> usize;

    /// Queue one byte for transmission
    ///
    /// Only called when [`CharIo::can_write`] is non-zero.
    fn write(&mut self, byte: u8);

    /// Wait until queued bytes have left the device
    fn flush(&mut self);
}
