//! Web reply sink
//!
//! The network stack collects messages for the next HTTP reply. The core
//! only needs to hand text over.

/// How a message combines with the pending reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReplyMode {
    /// Discard pending reply text first
    Replace,
    /// Append to pending reply text
    Append,
}

/// Destination for messages routed to the web interface
pub trait ReplySink {
    /// Deliver `text`, flagged as an error reply if `error` is set
    fn deliver(&mut self, text: &str, error: bool, mode: ReplyMode);
}
