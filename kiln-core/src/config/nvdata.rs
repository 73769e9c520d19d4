//! The persisted configuration record
//!
//! Everything the controller must remember across power cycles: network
//! identity, emulation mode, Z-probe calibration, per-heater PID and
//! thermistor parameters, and the last software reset diagnostics.

use serde::{Deserialize, Serialize};

use super::heater::{default_pid_parameters, PidParameters};
use super::limits::{AXES, HEATERS};
use super::zprobe::{ZProbeParameters, ZProbeType, Z_PROBE_STOP_HEIGHT};

/// Factory IP address
pub const IP_ADDRESS: [u8; 4] = [192, 168, 1, 14];
/// Factory netmask
pub const NET_MASK: [u8; 4] = [255, 255, 255, 0];
/// Factory gateway
pub const GATE_WAY: [u8; 4] = [192, 168, 1, 1];
/// Factory MAC address
pub const MAC_ADDRESS: [u8; 6] = [0xBE, 0xEF, 0xDE, 0xAD, 0xFE, 0xED];
/// Factory Z-probe axes: the probe is only used for Z
pub const Z_PROBE_AXES: [bool; AXES] = [false, false, true];

/// Firmware dialect emulated in replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Compatibility {
    /// Native replies
    Native = 0,
    /// RepRapFirmware (same as native)
    RepRapFirmware = 1,
    /// Marlin-style replies
    Marlin = 2,
    /// Teacup (not supported)
    Teacup = 3,
    /// Sprinter (not supported)
    Sprinter = 4,
    /// Repetier (not supported)
    Repetier = 5,
}

impl Compatibility {
    /// Whether this dialect can be selected
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Compatibility::Native | Compatibility::RepRapFirmware | Compatibility::Marlin
        )
    }

    /// RepRapFirmware is reported as native
    pub fn normalized(self) -> Self {
        match self {
            Compatibility::RepRapFirmware => Compatibility::Native,
            other => other,
        }
    }
}

/// Non-volatile configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NvData {
    /// Emulated firmware dialect
    pub compatibility: Compatibility,
    /// IPv4 address
    pub ip_address: [u8; 4],
    /// IPv4 netmask
    pub net_mask: [u8; 4],
    /// IPv4 gateway
    pub gateway: [u8; 4],
    /// Ethernet MAC address
    pub mac_address: [u8; 6],
    /// Fitted Z probe
    pub z_probe_type: ZProbeType,
    /// Axes the probe is used for
    pub z_probe_axes: [bool; AXES],
    /// Parameters used with [`ZProbeType::Switch`]
    pub switch_z_probe_parameters: ZProbeParameters,
    /// Parameters used with [`ZProbeType::Simple`] and [`ZProbeType::Modulated`]
    pub ir_z_probe_parameters: ZProbeParameters,
    /// Parameters used with [`ZProbeType::Alternate`]
    pub alternate_z_probe_parameters: ZProbeParameters,
    /// Per-heater PID and thermistor parameters
    pub pid_params: [PidParameters; HEATERS],
    /// Reason code of the last software reset
    pub reset_reason: u16,
    /// Never-used RAM recorded at the last software reset
    pub never_used_ram: u32,
}

impl Default for NvData {
    fn default() -> Self {
        Self::new()
    }
}

impl NvData {
    /// Factory configuration
    pub fn new() -> Self {
        Self {
            compatibility: Compatibility::Native,
            ip_address: IP_ADDRESS,
            net_mask: NET_MASK,
            gateway: GATE_WAY,
            mac_address: MAC_ADDRESS,
            z_probe_type: ZProbeType::Switch,
            z_probe_axes: Z_PROBE_AXES,
            switch_z_probe_parameters: ZProbeParameters::new(0.0),
            ir_z_probe_parameters: ZProbeParameters::new(Z_PROBE_STOP_HEIGHT),
            alternate_z_probe_parameters: ZProbeParameters::new(Z_PROBE_STOP_HEIGHT),
            pid_params: default_pid_parameters(),
            reset_reason: 0,
            never_used_ram: 0,
        }
    }

    /// Parameter set that applies to the current probe type
    pub fn z_probe_parameters(&self) -> &ZProbeParameters {
        match self.z_probe_type {
            ZProbeType::Switch => &self.switch_z_probe_parameters,
            ZProbeType::Simple | ZProbeType::Modulated => &self.ir_z_probe_parameters,
            ZProbeType::Alternate => &self.alternate_z_probe_parameters,
        }
    }

    /// Mutable parameter set for the current probe type
    pub fn z_probe_parameters_mut(&mut self) -> &mut ZProbeParameters {
        match self.z_probe_type {
            ZProbeType::Switch => &mut self.switch_z_probe_parameters,
            ZProbeType::Simple | ZProbeType::Modulated => &mut self.ir_z_probe_parameters,
            ZProbeType::Alternate => &mut self.alternate_z_probe_parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::zprobe::Z_PROBE_AD_VALUE;

    #[test]
    fn test_defaults() {
        let data = NvData::default();
        assert_eq!(data.ip_address, [192, 168, 1, 14]);
        assert_eq!(data.z_probe_type, ZProbeType::Switch);
        assert_eq!(data.z_probe_parameters().height, 0.0);
        assert_eq!(data.reset_reason, 0);
    }

    #[test]
    fn test_parameter_set_follows_type() {
        let mut data = NvData::new();
        data.z_probe_type = ZProbeType::Modulated;
        data.z_probe_parameters_mut().adc_value = 123;
        assert_eq!(data.ir_z_probe_parameters.adc_value, 123);

        data.z_probe_type = ZProbeType::Simple;
        assert_eq!(data.z_probe_parameters().adc_value, 123);

        data.z_probe_type = ZProbeType::Alternate;
        assert_eq!(data.z_probe_parameters().adc_value, Z_PROBE_AD_VALUE);
    }

    #[test]
    fn test_compatibility_support() {
        assert!(Compatibility::Marlin.is_supported());
        assert!(!Compatibility::Teacup.is_supported());
        assert_eq!(Compatibility::RepRapFirmware.normalized(), Compatibility::Native);
    }
}
