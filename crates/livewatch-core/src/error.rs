//! Domain-specific error types.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Platform identifier not in the supported set
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// Invalid field value on a configured target
    #[error("Invalid {field} for target '{target}': {reason}")]
    InvalidTarget {
        target: String,
        field: String,
        reason: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
