//! Collaborator traits
//!
//! Interfaces the core drives but does not implement: heater PWM outputs,
//! stepper current digipots and the network reply sink.

pub mod digipot;
pub mod heater;
pub mod reply;

pub use digipot::DigitalPot;
pub use heater::HeaterPwm;
pub use reply::{ReplyMode, ReplySink};
