//! Z-probe value computation
//!
//! Turns the two published probe filters into the 10-bit style readings the
//! homing and bed-probing code compare against the trigger threshold.

use super::filter::FilterCell;
use crate::config::limits::Z_PROBE_AVERAGE;
use crate::config::ZProbeType;

/// Which endstop condition a drive is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EndStopHit {
    /// Not at an endstop
    NoStop,
    /// At the low endstop
    LowHit,
    /// At the high endstop
    HighHit,
    /// Approaching the low endstop (analog probe within 10% of trigger)
    LowNear,
}

/// Current probe reading, 0 until both filters have a full history
///
/// Unmodulated probes average the two filters; the modulated IR probe
/// reports the lit-minus-dark difference, which cancels ambient light.
pub fn z_probe_value(probe: ZProbeType, on: &FilterCell, off: &FilterCell) -> i32 {
    let (on_sum, on_valid) = on.load();
    let (off_sum, off_valid) = off.load();
    if !(on_valid && off_valid) {
        return 0;
    }
    let n = Z_PROBE_AVERAGE as i64;
    match probe {
        ZProbeType::Simple | ZProbeType::Alternate => {
            ((on_sum as i64 + off_sum as i64) / (8 * n)) as i32
        }
        ZProbeType::Modulated => ((on_sum as i64 - off_sum as i64) / (4 * n)) as i32,
        ZProbeType::Switch => 0,
    }
}

/// Secondary readings of the probe
///
/// The modulated IR probe reports its lit reading; other probes have none.
///
/// # Returns
/// The number of values produced, and the values.
pub fn z_probe_secondary_values(probe: ZProbeType, on: &FilterCell) -> (usize, i32) {
    match probe {
        ZProbeType::Modulated => (1, (on.sum() / (4 * Z_PROBE_AVERAGE as u32)) as i32),
        _ => (0, 0),
    }
}

/// Classify an analog probe reading against its trigger threshold
pub fn z_probe_endstop(reading: i32, threshold: i32) -> EndStopHit {
    if reading >= threshold {
        EndStopHit::LowHit
    } else if reading as i64 * 10 >= threshold as i64 * 9 {
        EndStopHit::LowNear
    } else {
        EndStopHit::NoStop
    }
}
