//! Kiln Hardware Abstraction Layer
//!
//! Traits a board support package implements so that `kiln-core` can run
//! unchanged on different controller boards.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  kiln-core (sensing, config, I/O)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  kiln-hal (this crate - traits)         │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  board support package                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O
//! - [`uart::CharIo`] - Non-blocking raw character interface (USB, aux UART)
//! - [`adc::AdcConverter`] - Split start/read ADC conversions
//! - [`fs::FileSystem`] - Block filesystem on removable media
//! - [`flash::FlashStorage`] - Persistent storage
//! - [`timer::TickTimer`] - Periodic acquisition interrupt
//! - [`system::SystemControl`] - Reset, memory and watchdog hooks

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod flash;
pub mod fs;
pub mod gpio;
pub mod system;
pub mod timer;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use adc::AdcConverter;
pub use flash::{FlashError, FlashStorage, StorageKey};
pub use fs::{DirEntry, FileSystem, FsError, OpenMode};
pub use gpio::{InputPin, OutputPin};
pub use system::{MemoryStats, ResetCause, SystemControl};
pub use timer::TickTimer;
pub use uart::CharIo;
