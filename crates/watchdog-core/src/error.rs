//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session identifier could not be parsed
    #[error("Invalid session id: {value}")]
    InvalidSessionId { value: String },

    /// Duration string could not be parsed
    #[error("Invalid duration {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
