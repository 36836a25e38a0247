//! Failure classification.
//!
//! `classify` maps any engine failure onto a closed taxonomy of error
//! kinds, each tagged retryable or not. Matching is keyword-based on the
//! lower-cased error message: deliberately coarse and driver-agnostic, so
//! the same rules work whether the underlying driver is Postgres, MySQL, or
//! SQLite. All matching rules live in this one function, unit-testable in
//! isolation and swappable per target database without touching callers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Two transactions blocked on each other; the database aborted one.
    Deadlock,
    /// A statement or the whole transaction exceeded its deadline.
    Timeout,
    /// Unique / foreign-key / check / not-null violation.
    ConstraintViolation,
    /// Connection to the database lost or refused.
    ConnectionError,
    /// Client-facing validation failure.
    ValidationError,
    /// Domain rule violation.
    BusinessLogicError,
    /// Everything else; the message is deliberately generic.
    Unknown,
}

impl ErrorKind {
    /// Whether failures of this kind are believed transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Deadlock | ErrorKind::Timeout | ErrorKind::ConnectionError
        )
    }

    /// HTTP response class this kind maps to at the service boundary.
    pub fn client_status(&self) -> u16 {
        match self {
            ErrorKind::Deadlock => 409,
            ErrorKind::Timeout => 408,
            ErrorKind::ConstraintViolation => 400,
            ErrorKind::ConnectionError => 503,
            ErrorKind::ValidationError => 400,
            ErrorKind::BusinessLogicError => 422,
            ErrorKind::Unknown => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Deadlock => "deadlock",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::BusinessLogicError => "business_logic_error",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Classification result: kind, client-safe message, retryability, and the
/// failure that produced it. Created fresh per failure, never mutated.
#[derive(Debug)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Message safe to show a client; raw driver text never leaks here.
    pub message: String,
    pub retryable: bool,
    /// The original failure, for logs and error chains.
    pub cause: EngineError,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Classify a failure. Deterministic; never panics.
///
/// Priority order: client-facing variants first (their messages pass
/// through verbatim), then keyword groups from most to least specific.
pub fn classify(err: EngineError) -> ErrorRecord {
    // client-facing errors keep their identity and message
    match &err {
        EngineError::Validation { message } => {
            return record(ErrorKind::ValidationError, message.clone(), err);
        }
        EngineError::Business { message } => {
            return record(ErrorKind::BusinessLogicError, message.clone(), err);
        }
        _ => {}
    }

    let text = err.to_string().to_lowercase();

    if contains_any(&text, &["deadlock", "lock wait"]) {
        return record(
            ErrorKind::Deadlock,
            "The operation conflicted with another transaction, please retry".to_string(),
            err,
        );
    }
    if contains_any(&text, &["timeout", "timed out"]) {
        return record(
            ErrorKind::Timeout,
            "The operation timed out, please retry".to_string(),
            err,
        );
    }
    if contains_any(&text, &["constraint", "unique", "foreign key", "duplicate"]) {
        let message = constraint_message(&text);
        return record(ErrorKind::ConstraintViolation, message, err);
    }
    if contains_any(&text, &["connection", "connect", "econnrefused", "etimedout"]) {
        return record(
            ErrorKind::ConnectionError,
            "The database is temporarily unavailable".to_string(),
            err,
        );
    }

    record(
        ErrorKind::Unknown,
        "An unexpected error occurred".to_string(),
        err,
    )
}

fn record(kind: ErrorKind, message: String, cause: EngineError) -> ErrorRecord {
    ErrorRecord {
        kind,
        message,
        retryable: kind.is_transient(),
        cause,
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| text.contains(needle))
}

/// Derive a human-readable message from the violated constraint category.
fn constraint_message(text: &str) -> String {
    let message = if text.contains("email") {
        "A record with this email already exists"
    } else if text.contains("isbn") {
        "A book with this ISBN already exists"
    } else if text.contains("foreign key") {
        "A referenced record does not exist"
    } else if text.contains("check") {
        "A value violates a check constraint"
    } else if text.contains("not null") || text.contains("not-null") {
        "A required field is missing"
    } else {
        "The operation violates a data constraint"
    };
    message.to_string()
}
