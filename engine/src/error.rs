//! Error types for the Roster sync engine.

use crate::{ConflictId, OperationId};
use thiserror::Error;

/// All possible errors from the sync engine.
///
/// Running out of retry attempts is deliberately absent: it is a state
/// transition (`failed`), not an error surfaced to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    // Resolution errors
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("conflict still open for operation: {0}")]
    ConflictStillOpen(OperationId),

    // State errors
    #[error("operation not in flight: {0}")]
    NotInFlight(OperationId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Whether this error means an unknown id was requested.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::OperationNotFound(_) | Error::ConflictNotFound(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
