//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid session id format")]
    InvalidSessionId,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
