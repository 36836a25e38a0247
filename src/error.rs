//! Crate-wide error type.
//!
//! Units of work, the coordinator, and the batch orchestrator all speak
//! `EngineError`. Module-specific failures convert in via `#[from]`; the
//! `Validation` and `Business` variants exist so client-facing errors keep
//! their identity through the recovery layer (they are never retried and
//! their messages pass through verbatim).

use thiserror::Error;

use crate::driver::DriverError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while executing a unit of work.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persistence driver failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// Client-facing validation failure; the message is safe to surface.
    #[error("{message}")]
    Validation { message: String },

    /// Domain rule violation raised by business logic; safe to surface.
    #[error("{message}")]
    Business { message: String },

    /// A savepoint name was reused within one transaction (caller error).
    #[error("savepoint \"{name}\" already used in this transaction")]
    SavepointReused { name: String },

    /// The transactional audit write failed, so the mutation was rolled
    /// back (entry and mutation share fate).
    #[error("audit write failed: {0}")]
    Audit(String),

    /// Internal error that shouldn't happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Build a validation error (client-facing, non-retryable).
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    /// Build a business-logic error (client-facing, non-retryable).
    pub fn business(message: impl Into<String>) -> Self {
        EngineError::Business {
            message: message.into(),
        }
    }
}
