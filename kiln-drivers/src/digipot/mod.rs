//! Digital potentiometer drivers

pub mod mcp4461;

pub use mcp4461::{Mcp4461, Mcp4461Error};
