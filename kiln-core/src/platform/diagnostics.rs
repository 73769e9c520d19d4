//! Diagnostics report, test hooks and software reset

use kiln_hal::SystemControl;

use super::{Board, Platform};
use crate::fmt::{info, warn};
use crate::transport::MessageType;

/// Software reset reason codes and flag bits
///
/// The low byte holds the reason; the flags record what the firmware was
/// doing when the reset was requested.
pub mod reset_reason {
    /// Reset requested by the user
    pub const USER: u16 = 0;
    /// Reset while writing to the auxiliary serial line
    pub const IN_AUX_OUTPUT: u16 = 0x0800;
    /// Main loop stopped making progress
    pub const STUCK_IN_SPIN: u16 = 0x1000;
    /// Reset while the network stack was busy
    pub const IN_LWIP_SPIN: u16 = 0x2000;
    /// Reset while writing to the host serial line
    pub const IN_USB_OUTPUT: u16 = 0x4000;
}

/// Fault-injection tests selectable from G-code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiagnosticTest {
    /// Stop servicing the tick interrupt so the watchdog fires
    Watchdog = 1001,
    /// Hang the main loop
    SpinLockup = 1002,
}

impl DiagnosticTest {
    /// Test selected by a numeric code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1001 => Some(DiagnosticTest::Watchdog),
            1002 => Some(DiagnosticTest::SpinLockup),
            _ => None,
        }
    }
}

impl<B: Board> Platform<'_, B> {
    /// Run a fault-injection test; unknown codes are ignored
    pub fn diagnostic_test(&mut self, code: i32) {
        match DiagnosticTest::from_code(code) {
            Some(DiagnosticTest::Watchdog) => {
                warn!("diagnostic test: disabling tick interrupt");
                self.system.disable_tick_interrupt();
            }
            Some(DiagnosticTest::SpinLockup) => {
                warn!("diagnostic test: spin lockup");
                self.debug_code = Some(DiagnosticTest::SpinLockup);
            }
            None => {}
        }
    }

    /// Record why we are resetting and reset the MCU
    ///
    /// For a non-zero `reason` the flags of any serial write in progress and
    /// of a busy network stack are added. On hardware this does not return.
    pub async fn software_reset(&mut self, mut reason: u16, network_busy: bool) {
        if reason != reset_reason::USER {
            if self.line.in_write() {
                reason |= reset_reason::IN_USB_OUTPUT;
            }
            if self.aux.in_write() {
                reason |= reset_reason::IN_AUX_OUTPUT;
            }
            if network_busy {
                reason |= reset_reason::IN_LWIP_SPIN;
            }
        }

        info!("software reset, reason {:x}", reason);
        let never_used = self.system.memory_stats().never_used;
        if let Err(e) = self.config.record_software_reset(reason, never_used).await {
            warn!("failed to record reset reason: {}", e);
        }
        self.system.request_reset();
    }

    /// Send the platform diagnostics report
    ///
    /// `probe_heights` are the bed heights of the last probing run.
    pub fn diagnostics(&mut self, probe_heights: &[f32]) {
        const KIND: MessageType = MessageType::Both;

        self.message(KIND, "Platform Diagnostics:\n");

        let mem = self.system.memory_stats();
        self.append_message(KIND, "Memory usage:\n");
        let lines = [
            ("Program static ram used", mem.static_ram),
            ("Dynamic ram used", mem.dynamic_ram),
            ("Recycled dynamic ram", mem.recycled_ram),
            ("Current stack ram used", mem.current_stack),
            ("Maximum stack ram used", mem.max_stack),
            ("Never used ram", mem.never_used),
        ];
        for (label, value) in lines {
            self.append_message_fmt(KIND, format_args!("{}: {}\n", label, value));
        }

        let up = self.uptime().as_secs();
        let cause = self.system.reset_cause().name();
        self.append_message_fmt(
            KIND,
            format_args!(
                "Last reset {:02}:{:02}:{:02} ago, cause: {}\n",
                up / 3600,
                (up % 3600) / 60,
                up % 60,
                cause
            ),
        );

        let data = self.config.data();
        let (reason, never_used) = (data.reset_reason, data.never_used_ram);
        self.append_message_fmt(
            KIND,
            format_args!(
                "Last software reset code & available RAM: 0x{:04x}, {}\n",
                reason, never_used
            ),
        );

        let errors = self.shared.error_bits();
        self.append_message_fmt(KIND, format_args!("Error status: {}\n", errors));

        self.append_message(KIND, "Bed probe heights:");
        for height in probe_heights {
            self.append_message_fmt(KIND, format_args!(" {:.3}", height));
        }
        self.append_message(KIND, "\n");

        let free = self.storage.free_file_entries();
        self.append_message_fmt(KIND, format_args!("Free file entries: {}\n", free));

        // Measured since the last report
        let longest = self.storage.get_and_clear_longest_write_time();
        let longest_ms = longest.as_micros() as f32 / 1000.0;
        self.append_message_fmt(
            KIND,
            format_args!("Longest block write time: {:.1}ms\n", longest_ms),
        );
    }
}
