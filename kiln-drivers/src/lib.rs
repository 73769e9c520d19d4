//! Hardware driver implementations
//!
//! Concrete implementations of the collaborator traits defined in
//! kiln-core:
//!
//! - Digital potentiometers for stepper current (MCP4461)

#![no_std]
#![deny(unsafe_code)]

pub mod digipot;
