//! Sensor acquisition
//!
//! The interrupt-side state machine, its averaging filters, the state it
//! shares with the foreground, and Z-probe value computation.

pub mod acquisition;
pub mod filter;
pub mod probe;
pub mod shared;

pub use acquisition::{Acquisition, TickState};
pub use filter::{AveragingFilter, FilterCell};
pub use probe::EndStopHit;
pub use shared::{SensorShared, ERROR_BAD_TEMP};
