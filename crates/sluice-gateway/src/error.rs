use thiserror::Error;

use sluice_core::{ProtocolError, SessionId};

/// Failure to hand a message to a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    #[error("session registry is shut down")]
    RegistryClosed,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
