//! Error types for the RTU simulator core.

use thiserror::Error;

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, RtuSimError>;

/// RTU simulator error types.
#[derive(Debug, Error)]
pub enum RtuSimError {
    /// An IOA is already registered
    #[error("Duplicate IOA: {0}")]
    DuplicateAddress(u32),

    /// Operation on an IOA that is not registered
    #[error("Unknown IOA: {0}")]
    UnknownAddress(u32),

    /// Entity or point fields are inconsistent
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity lookup failure
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Entity id already in use
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    /// Command refused by domain rules (e.g. entity in local mode)
    #[error("Command refused: {0}")]
    Refused(String),

    /// Protocol stack rejected or failed an outbound send
    #[error("Transient I/O error: {0}")]
    Transient(String),

    /// The core is shutting down or already stopped
    #[error("Simulator is shut down")]
    Shutdown,

    /// Failed to start the external protocol stack
    #[error("Protocol stack startup failed: {0}")]
    StackStartup(String),

    /// Import payload could not be decoded
    #[error("Import error: {0}")]
    Import(#[from] serde_json::Error),
}

impl RtuSimError {
    /// Create a validation error with a message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a transient I/O error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a command refusal.
    pub fn refused(msg: impl Into<String>) -> Self {
        Self::Refused(msg.into())
    }
}
