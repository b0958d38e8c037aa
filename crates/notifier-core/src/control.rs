//! Control tokens for the driver's shutdown channel.
//!
//! Producers send plain strings. Only `"shutdown"` means anything; every
//! other token is reported back as `Unknown` so the driver can log it and
//! carry on.

use core::fmt;

/// The one recognized control token.
pub const SHUTDOWN_TOKEN: &str = "shutdown";

/// A decoded control token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Stop the driver after the current cycle.
    Shutdown,
    /// Anything else. Logged and ignored.
    Unknown(String),
}

impl ControlMessage {
    /// Decode a raw token. Matching is exact and case-sensitive.
    pub fn parse(token: &str) -> Self {
        if token == SHUTDOWN_TOKEN {
            ControlMessage::Shutdown
        } else {
            ControlMessage::Unknown(token.to_string())
        }
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ControlMessage::Shutdown)
    }
}

impl From<String> for ControlMessage {
    fn from(token: String) -> Self {
        if token == SHUTDOWN_TOKEN {
            ControlMessage::Shutdown
        } else {
            ControlMessage::Unknown(token)
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Shutdown => f.write_str(SHUTDOWN_TOKEN),
            ControlMessage::Unknown(token) => write!(f, "{:?}", token),
        }
    }
}
