//! Board-agnostic hardware-abstraction core for printer controllers
//!
//! This crate sits between the hardware traits of `kiln-hal` and the
//! G-code, motion and heating layers of a printer firmware:
//!
//! - Interrupt-driven ADC acquisition with averaging filters and a
//!   hardware-level overheat/disconnect cutoff
//! - Non-volatile configuration with magic/version/CRC validation
//! - Buffered serial line transport with output backpressure
//! - Buffered file store pool over a FAT filesystem
//! - The `Platform` façade tying these together with actuators,
//!   message routing and diagnostics

#![no_std]
#![deny(unsafe_code)]

pub(crate) mod fmt;

pub mod config;
pub mod platform;
pub mod sensing;
pub mod storage;
pub mod traits;
pub mod transport;

pub use platform::{Board, BoardConfig, Platform, PlatformParts};
