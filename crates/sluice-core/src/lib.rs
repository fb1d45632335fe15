//! Sluice Core - shared types for the real-time gateway
//!
//! The session wire protocol spoken with browser clients and the fragment
//! type produced by streaming backends.

pub mod fragment;
pub mod protocol;

pub use fragment::ContentFragment;
pub use protocol::{
    ChatPayload, ContentKind, Envelope, ErrorPayload, MessageType, Payload, ProtocolError,
};

use std::fmt;

/// Opaque identity of one duplex session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
