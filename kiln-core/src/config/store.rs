//! Non-volatile configuration store
//!
//! Holds the working copy of [`NvData`] and persists it through a
//! [`FlashStorage`] backend. Every setter compares before writing so that
//! repeated identical commands never wear the flash.
//!
//! On-flash layout: the postcard encoding of `{ magic, version, data }`
//! followed by a little-endian CRC-32 of those bytes.

use kiln_hal::{FlashError, FlashStorage, StorageKey};
use serde::{Deserialize, Serialize};

use super::heater::PidParameters;
use super::limits::{AXES, HEATERS};
use super::nvdata::{Compatibility, NvData};
use super::zprobe::{ZProbeParameters, ZProbeType};
use crate::fmt::{debug, info, warn};

/// Magic number identifying a Kiln configuration record
pub const NV_MAGIC: u32 = 0x4B4E_5644; // "KNVD"

/// Current record schema version; any other version is discarded
pub const NV_VERSION: u8 = 1;

/// Largest serialized record including the CRC
pub const MAX_NV_RECORD_SIZE: usize = 768;

/// Configuration persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Flash operation failed
    Flash(FlashError),
    /// Serialization failed
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// CRC check failed
    CrcMismatch,
    /// Wrong magic number
    InvalidMagic,
    /// Record written by a different schema version
    VersionMismatch,
    /// Heater index out of range
    InvalidHeater,
    /// Emulation mode that cannot be selected
    UnsupportedCompatibility,
}

impl From<FlashError> for ConfigError {
    fn from(e: FlashError) -> Self {
        ConfigError::Flash(e)
    }
}

#[derive(Serialize)]
struct RecordRef<'a> {
    magic: u32,
    version: u8,
    data: &'a NvData,
}

#[derive(Deserialize)]
struct Record {
    magic: u32,
    version: u8,
    data: NvData,
}

/// Serialize `data` into `buffer` as a complete record
///
/// # Returns
/// The number of bytes used.
pub fn encode_record(data: &NvData, buffer: &mut [u8]) -> Result<usize, ConfigError> {
    let record = RecordRef {
        magic: NV_MAGIC,
        version: NV_VERSION,
        data,
    };
    let len = postcard::to_slice(&record, buffer)
        .map_err(|_| ConfigError::Serialize)?
        .len();
    let crc = crc32(&buffer[..len]);
    let end = len + 4;
    if end > buffer.len() {
        return Err(ConfigError::Serialize);
    }
    buffer[len..end].copy_from_slice(&crc.to_le_bytes());
    Ok(end)
}

/// Validate and decode a complete record
pub fn decode_record(bytes: &[u8]) -> Result<NvData, ConfigError> {
    if bytes.len() < 4 {
        return Err(ConfigError::Deserialize);
    }
    let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    // Check the header before the CRC so a foreign record is reported as such
    let record: Result<Record, _> = postcard::from_bytes(body);
    match record {
        Ok(record) if record.magic != NV_MAGIC => Err(ConfigError::InvalidMagic),
        Ok(record) if record.version != NV_VERSION => Err(ConfigError::VersionMismatch),
        Ok(_) if crc32(body) != stored_crc => Err(ConfigError::CrcMismatch),
        Ok(record) => Ok(record.data),
        Err(_) => Err(ConfigError::Deserialize),
    }
}

/// CRC-32 (IEEE 802.3 polynomial) of `data`
pub fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc: u32 = 0xFFFF_FFFF;

    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    !crc
}

/// Working copy of the configuration plus its backing storage
pub struct NvConfigStore<S> {
    storage: S,
    data: NvData,
    loaded_defaults: bool,
}

impl<S: FlashStorage> NvConfigStore<S> {
    /// Load the stored record, falling back to factory defaults
    ///
    /// A missing, undecodable, foreign, outdated or corrupt record is
    /// replaced in full by [`NvData::new`] and written back immediately.
    /// A failure to write the defaults is logged; the store still holds
    /// them in RAM.
    pub async fn load(storage: S) -> Self {
        let mut store = Self {
            storage,
            data: NvData::new(),
            loaded_defaults: false,
        };

        match store.read_record().await {
            Ok(data) => {
                info!("Loaded non-volatile config");
                store.data = data;
            }
            Err(e) => {
                match e {
                    ConfigError::Flash(FlashError::NotFound) => {
                        debug!("No non-volatile config stored, writing defaults")
                    }
                    other => warn!("Non-volatile config rejected: {:?}, writing defaults", other),
                }
                store.loaded_defaults = true;
                if let Err(e) = store.write_nv_data().await {
                    warn!("Failed to persist default config: {:?}", e);
                }
            }
        }

        store
    }

    async fn read_record(&mut self) -> Result<NvData, ConfigError> {
        let mut buffer = [0u8; MAX_NV_RECORD_SIZE];
        let len = self.storage.read(StorageKey::NvConfig, &mut buffer).await?;
        debug!("Read {} bytes of config from flash", len);
        decode_record(&buffer[..len])
    }

    /// Current configuration
    pub fn data(&self) -> &NvData {
        &self.data
    }

    /// Whether the factory defaults replaced the stored record at load
    pub fn loaded_defaults(&self) -> bool {
        self.loaded_defaults
    }

    /// Backing storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mutable access to the backing storage
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Write the whole record to flash
    pub async fn write_nv_data(&mut self) -> Result<(), ConfigError> {
        let mut buffer = [0u8; MAX_NV_RECORD_SIZE];
        let len = encode_record(&self.data, &mut buffer)?;
        debug!("Saving {} bytes of config to flash", len);
        self.storage
            .write(StorageKey::NvConfig, &buffer[..len])
            .await
            .map_err(ConfigError::Flash)
    }

    /// Replace one field, persisting only if its value changed
    ///
    /// The in-memory value is updated even if the write fails.
    async fn update<T: PartialEq>(
        &mut self,
        value: T,
        field: impl FnOnce(&mut NvData) -> &mut T,
    ) -> Result<bool, ConfigError> {
        let slot = field(&mut self.data);
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        self.write_nv_data().await?;
        Ok(true)
    }

    /// Select the emulated firmware dialect
    ///
    /// RepRapFirmware is stored as native. Unsupported dialects are
    /// rejected without touching the record.
    pub async fn set_compatibility(&mut self, c: Compatibility) -> Result<bool, ConfigError> {
        if !c.is_supported() {
            return Err(ConfigError::UnsupportedCompatibility);
        }
        self.update(c.normalized(), |d| &mut d.compatibility).await
    }

    /// Set the IPv4 address
    pub async fn set_ip_address(&mut self, ip: [u8; 4]) -> Result<bool, ConfigError> {
        self.update(ip, |d| &mut d.ip_address).await
    }

    /// Set the IPv4 netmask
    pub async fn set_net_mask(&mut self, mask: [u8; 4]) -> Result<bool, ConfigError> {
        self.update(mask, |d| &mut d.net_mask).await
    }

    /// Set the IPv4 gateway
    pub async fn set_gateway(&mut self, gateway: [u8; 4]) -> Result<bool, ConfigError> {
        self.update(gateway, |d| &mut d.gateway).await
    }

    /// Set the MAC address
    pub async fn set_mac_address(&mut self, mac: [u8; 6]) -> Result<bool, ConfigError> {
        self.update(mac, |d| &mut d.mac_address).await
    }

    /// Select the Z-probe type
    pub async fn set_z_probe_type(&mut self, probe: ZProbeType) -> Result<bool, ConfigError> {
        self.update(probe, |d| &mut d.z_probe_type).await
    }

    /// Select which axes the probe is used for
    pub async fn set_z_probe_axes(&mut self, axes: [bool; AXES]) -> Result<bool, ConfigError> {
        self.update(axes, |d| &mut d.z_probe_axes).await
    }

    /// Replace the parameter set of the current probe type
    pub async fn set_z_probe_parameters(
        &mut self,
        params: ZProbeParameters,
    ) -> Result<bool, ConfigError> {
        self.update(params, |d| d.z_probe_parameters_mut()).await
    }

    /// Replace one heater's PID and thermistor parameters
    pub async fn set_pid_parameters(
        &mut self,
        heater: usize,
        params: PidParameters,
    ) -> Result<bool, ConfigError> {
        if heater >= HEATERS {
            return Err(ConfigError::InvalidHeater);
        }
        self.update(params, |d| &mut d.pid_params[heater]).await
    }

    /// Record the diagnostics of an imminent software reset
    ///
    /// Written when the reason is non-zero or differs from the stored one.
    pub async fn record_software_reset(
        &mut self,
        reason: u16,
        never_used_ram: u32,
    ) -> Result<bool, ConfigError> {
        if reason == 0 && reason == self.data.reset_reason {
            return Ok(false);
        }
        self.data.reset_reason = reason;
        self.data.never_used_ram = never_used_ram;
        self.write_nv_data().await?;
        Ok(true)
    }
}
