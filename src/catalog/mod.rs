//! Bookstore table layout.
//!
//! The engine is schema-light by design (ORM mapping stays outside it), but
//! the batch orchestrator and audit sink need to agree with the driver on
//! table names and on which columns are unique. `TableSpec` captures exactly
//! that much and nothing more.

use serde::{Deserialize, Serialize};

use crate::driver::TableName;

/// Minimal description of a table: its name plus unique columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: TableName,
    /// Columns with a unique constraint (primary key is always unique).
    pub unique: Vec<String>,
}

impl TableSpec {
    /// Create a spec with no unique columns.
    pub fn new(name: TableName) -> Self {
        Self {
            name,
            unique: Vec::new(),
        }
    }

    /// Add a unique column.
    pub fn with_unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }
}

/// the books table
pub fn books() -> TableName {
    TableName::new("books").expect("static name")
}

/// the authors lookup table
pub fn authors() -> TableName {
    TableName::new("authors").expect("static name")
}

/// the publishers lookup table
pub fn publishers() -> TableName {
    TableName::new("publishers").expect("static name")
}

/// the genres lookup table
pub fn genres() -> TableName {
    TableName::new("genres").expect("static name")
}

/// the audit trail table
pub fn audit_log() -> TableName {
    TableName::new("audit_log").expect("static name")
}

/// The full catalog schema the engine mutates.
///
/// Lookup tables are unique by name so find-or-create stays deterministic
/// under the sequential row processing the batch orchestrator guarantees.
pub fn bookstore_schema() -> Vec<TableSpec> {
    vec![
        TableSpec::new(books()).with_unique("isbn"),
        TableSpec::new(authors()).with_unique("name"),
        TableSpec::new(publishers()).with_unique("name"),
        TableSpec::new(genres()).with_unique("name"),
        TableSpec::new(audit_log()),
    ]
}
