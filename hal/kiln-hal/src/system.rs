//! System control hooks
//!
//! Chip-level services the diagnostics and reset paths need: memory
//! accounting, the hardware reset cause, and the reset itself.

/// Why the MCU last came out of reset, as reported by the reset controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    /// Power-on or brown-out
    PowerUp,
    /// Backup (low-power) reset
    Backup,
    /// Watchdog timeout
    Watchdog,
    /// Software-requested reset
    Software,
    /// Reset pin or debugger
    User,
    /// Anything the controller does not report
    Unknown,
}

impl ResetCause {
    /// Name used in the diagnostics report
    pub fn name(self) -> &'static str {
        match self {
            ResetCause::PowerUp => "power up",
            ResetCause::Backup => "backup",
            ResetCause::Watchdog => "watchdog",
            ResetCause::Software => "software",
            ResetCause::User => "reset button",
            ResetCause::Unknown => "unknown",
        }
    }
}

/// RAM usage figures, all in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryStats {
    /// Statically allocated RAM (.data + .bss)
    pub static_ram: u32,
    /// Dynamic RAM handed out so far
    pub dynamic_ram: u32,
    /// Dynamic RAM freed and available for reuse
    pub recycled_ram: u32,
    /// Stack in use at the time of the call
    pub current_stack: u32,
    /// Stack high-water mark
    pub max_stack: u32,
    /// RAM never touched since reset (between heap top and stack low-water)
    pub never_used: u32,
}

/// Chip-level control
pub trait SystemControl {
    /// Snapshot of RAM usage
    fn memory_stats(&self) -> MemoryStats;

    /// Cause of the most recent reset
    fn reset_cause(&self) -> ResetCause;

    /// Reset the MCU
    ///
    /// On hardware this does not return. Test doubles may record the
    /// request and return.
    fn request_reset(&mut self);

    /// Stop servicing the tick interrupt so the watchdog fires
    fn disable_tick_interrupt(&mut self);
}
