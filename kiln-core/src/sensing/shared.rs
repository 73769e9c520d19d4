//! State shared between the acquisition interrupt and the foreground
//!
//! Every field has exactly one writer. The interrupt writes the filter
//! cells, heater faults and error bits; the foreground writes thresholds,
//! the probe type and the re-initialisation request. Fault bits are also
//! cleared by the foreground, which is why they use read-modify-write.

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use super::filter::FilterCell;
use crate::config::limits::HEATERS;
use crate::config::ZProbeType;

/// Error bit: a thermistor reported overheat or disconnection
pub const ERROR_BAD_TEMP: u32 = 1 << 0;

/// Interrupt/foreground shared sensor state
///
/// Designed to live in a `static` so the interrupt handler can reach it.
#[derive(Debug)]
pub struct SensorShared {
    thermistors: [FilterCell; HEATERS],
    z_probe_on: FilterCell,
    z_probe_off: FilterCell,
    overheat_sums: [AtomicU32; HEATERS],
    z_probe_type: AtomicU8,
    probe_reinit: AtomicBool,
    heater_faults: AtomicU32,
    error_bits: AtomicU32,
    active: AtomicBool,
}

impl SensorShared {
    /// Everything zeroed and inactive
    pub const fn new() -> Self {
        Self {
            thermistors: [const { FilterCell::new() }; HEATERS],
            z_probe_on: FilterCell::new(),
            z_probe_off: FilterCell::new(),
            overheat_sums: [const { AtomicU32::new(0) }; HEATERS],
            z_probe_type: AtomicU8::new(0),
            probe_reinit: AtomicBool::new(false),
            heater_faults: AtomicU32::new(0),
            error_bits: AtomicU32::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Published thermistor filter of `heater`
    pub fn thermistor(&self, heater: usize) -> &FilterCell {
        &self.thermistors[heater]
    }

    /// Published Z-probe filter sampled with the emitter on
    pub fn z_probe_on(&self) -> &FilterCell {
        &self.z_probe_on
    }

    /// Published Z-probe filter sampled with the emitter off
    pub fn z_probe_off(&self) -> &FilterCell {
        &self.z_probe_off
    }

    /// Filter sum below which `heater` is overheated
    pub fn overheat_sum(&self, heater: usize) -> u32 {
        self.overheat_sums[heater].load(Ordering::Relaxed)
    }

    /// Set the overheat threshold of `heater`
    pub fn set_overheat_sum(&self, heater: usize, sum: u32) {
        self.overheat_sums[heater].store(sum, Ordering::Relaxed);
    }

    /// Probe type the interrupt acts on
    pub fn z_probe_type(&self) -> ZProbeType {
        ZProbeType::from_u8(self.z_probe_type.load(Ordering::Relaxed))
    }

    /// Change the probe type and ask the interrupt to reset the probe
    /// filters and modulation output on its next tick
    pub fn request_probe_reinit(&self, probe: ZProbeType) {
        self.z_probe_type.store(probe.as_u8(), Ordering::Relaxed);
        self.probe_reinit.store(true, Ordering::Release);
    }

    /// Consume a pending re-initialisation request
    pub fn take_probe_reinit(&self) -> bool {
        self.probe_reinit.swap(false, Ordering::Acquire)
    }

    /// Latch a fault on `heater`
    pub fn flag_heater_fault(&self, heater: usize) {
        self.heater_faults.fetch_or(1 << heater, Ordering::AcqRel);
        self.error_bits.fetch_or(ERROR_BAD_TEMP, Ordering::AcqRel);
    }

    /// Whether `heater` has a latched fault
    pub fn heater_fault(&self, heater: usize) -> bool {
        self.heater_faults.load(Ordering::Acquire) & (1 << heater) != 0
    }

    /// Bitmask of faulted heaters
    pub fn heater_faults(&self) -> u32 {
        self.heater_faults.load(Ordering::Acquire)
    }

    /// Clear the latched fault of `heater`
    pub fn clear_heater_fault(&self, heater: usize) {
        self.heater_faults.fetch_and(!(1 << heater), Ordering::AcqRel);
    }

    /// Accumulated error bits
    pub fn error_bits(&self) -> u32 {
        self.error_bits.load(Ordering::Acquire)
    }

    /// Set additional error bits
    pub fn set_error_bits(&self, bits: u32) {
        self.error_bits.fetch_or(bits, Ordering::AcqRel);
    }

    /// Clear all error bits
    pub fn clear_error_bits(&self) {
        self.error_bits.store(0, Ordering::Release);
    }

    /// Whether acquisition ticks are processed
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Enable or disable processing of acquisition ticks
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }
}

impl Default for SensorShared {
    fn default() -> Self {
        Self::new()
    }
}
