//! Serial transport and message routing

pub mod line;
pub mod message;

pub use line::Line;
pub use message::{LineRoute, MessageType, Route, WebRoute};
