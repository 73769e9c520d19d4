//! Message kinds and their destinations
//!
//! Every user-visible message names a kind; the kind alone decides which
//! sinks receive it. Routing is a pure function so it can be checked
//! without any I/O.

/// Kind of user-visible message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageType {
    /// Reply to the host on the serial line
    Host,
    /// Debug output on the serial line, written blocking
    Debug,
    /// Reply to the web interface
    Web,
    /// Error reply to the web interface
    WebError,
    /// Serial line and web interface
    Both,
    /// Serial line and web interface, flagged as an error
    #[default]
    BothError,
}

/// How a message is written to the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineRoute {
    /// Wait for buffer space instead of truncating
    pub blocking: bool,
}

/// How a message is handed to the web reply sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WebRoute {
    /// Flag the reply as an error
    pub error: bool,
}

/// Destinations of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Route {
    /// Serial line delivery, if any
    pub line: Option<LineRoute>,
    /// Web delivery, if any
    pub web: Option<WebRoute>,
}

impl MessageType {
    /// Where messages of this kind go
    pub const fn route(self) -> Route {
        let line = match self {
            MessageType::Host | MessageType::Both | MessageType::BothError => {
                Some(LineRoute { blocking: false })
            }
            MessageType::Debug => Some(LineRoute { blocking: true }),
            MessageType::Web | MessageType::WebError => None,
        };
        let web = match self {
            MessageType::Web | MessageType::Both => Some(WebRoute { error: false }),
            MessageType::WebError | MessageType::BothError => Some(WebRoute { error: true }),
            MessageType::Host | MessageType::Debug => None,
        };
        Route { line, web }
    }
}
