//! Error types for log compression, storage, and the SLCP protocol

use thiserror::Error;

use crate::protocol::ErrorKind;

/// Result type alias for slc operations
pub type Result<T> = std::result::Result<T, SlcError>;

/// Errors that can occur while serving, storing, or encoding logs
#[derive(Error, Debug)]
pub enum SlcError {
    /// Missing credential source or token mismatch
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid context name, or a context operation without a bound context
    #[error("Context error: {0}")]
    Context(String),

    /// Unrecognized command or malformed line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Log, counters, or credential file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// Counters snapshot could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlcError {
    /// Check if this error ends the session it occurred in
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Context(_) | Self::Protocol(_))
    }

    /// Wire error kind reported for this error when no command-specific kind applies
    pub fn reply_kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Context(_) => ErrorKind::Context,
            Self::Protocol(_) | Self::Config(_) | Self::Internal(_) => ErrorKind::Cmd,
            Self::Persistence(_) | Self::Serialization(_) => ErrorKind::Process,
        }
    }
}
