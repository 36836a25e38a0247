//! Driver layer error types
//!
//! All errors that can cross the persistence boundary are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages.
//!
//! The `Display` texts matter more than usual: the recovery layer classifies
//! failures by keyword matching on the rendered message (driver-agnostic by
//! design), so variants carry the same vocabulary real drivers emit
//! ("deadlock detected", "duplicate key value violates unique constraint ...").

use thiserror::Error;

use crate::driver::types::{InvalidNameError, RowKey, TableName};

/// the main error type for driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    /// the requested row was not found
    #[error("row not found: table={table}, key={key}")]
    RowNotFound { table: TableName, key: RowKey },

    /// the requested table was not found
    #[error("relation \"{0}\" does not exist")]
    TableNotFound(TableName),

    /// a unique or foreign-key constraint was violated
    ///
    /// carries the raw driver text verbatim, e.g.
    /// `duplicate key value violates unique constraint "books_isbn_key"`
    #[error("{0}")]
    Constraint(String),

    /// deadlock reported by the database
    #[error("deadlock detected")]
    Deadlock,

    /// a statement exceeded the transaction's deadline
    #[error("statement timeout: transaction exceeded its deadline")]
    StatementTimeout,

    /// the connection to the database was lost or refused
    #[error("connection error: {0}")]
    Connection(String),

    /// savepoint referenced before being created
    #[error("savepoint \"{0}\" does not exist")]
    UnknownSavepoint(String),

    /// invalid table or key name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// internal error that shouldn't happen
    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriverError::RowNotFound { .. } | DriverError::TableNotFound(_)
        )
    }

    /// check if this error is a constraint violation
    pub fn is_constraint(&self) -> bool {
        matches!(self, DriverError::Constraint(_))
    }

    /// build a unique-constraint violation in the driver's native phrasing
    pub fn unique_violation(table: &TableName, field: &str) -> Self {
        DriverError::Constraint(format!(
            "duplicate key value violates unique constraint \"{}_{}_key\"",
            table, field
        ))
    }

    /// build a duplicate-primary-key violation
    pub fn pkey_violation(table: &TableName, key: &RowKey) -> Self {
        DriverError::Constraint(format!(
            "duplicate key value violates unique constraint \"{}_pkey\" (key={})",
            table, key
        ))
    }
}

/// result type alias for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_predicate() {
        let not_found = DriverError::TableNotFound(TableName::new("books").unwrap());
        assert!(not_found.is_not_found());
        assert!(!not_found.is_constraint());
    }

    #[test]
    fn test_unique_violation_text() {
        let table = TableName::new("books").unwrap();
        let err = DriverError::unique_violation(&table, "isbn");
        assert!(err.is_constraint());
        assert_eq!(
            err.to_string(),
            "duplicate key value violates unique constraint \"books_isbn_key\""
        );
    }
}
