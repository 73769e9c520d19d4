//! Configuration
//!
//! Compile-time limits, the persisted non-volatile record and the store that
//! loads and writes it.

pub mod heater;
pub mod limits;
pub mod nvdata;
pub mod store;
pub mod zprobe;

pub use heater::PidParameters;
pub use limits::*;
pub use nvdata::{Compatibility, NvData};
pub use store::{ConfigError, NvConfigStore};
pub use zprobe::{ZProbeParameters, ZProbeType};
