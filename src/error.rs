//! Call-related error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("call not found: {0}")]
    NotFound(String),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] crate::state::InvalidTransition),

    #[error("call already exists: {0}")]
    AlreadyExists(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("media engine error: {0}")]
    Media(String),

    #[error("invalid ICE server: {0}")]
    InvalidIceServer(String),

    #[error("coordinator is shut down")]
    ShutDown,
}
