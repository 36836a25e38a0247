//! persistence driver boundary for the engine
//!
//! this module defines the contract the engine consumes from whatever
//! relational driver sits underneath it. The upper layers (transaction
//! coordinator, batch orchestrator) use these traits and never touch a
//! concrete database client directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TransactionCoordinator / Batch                 │
//! │        (units of work, savepoints, audit co-commit)         │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Driver / TxHandle                        │
//! │   (begin, statements, savepoints, deadline, commit/rollback)│
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//!                               ▼
//!                     Postgres / MySQL / SQLite
//!                    (or MemoryDriver in tests)
//! ```
//!
//! One connection is taken from the pool per active transaction and returned
//! at resolution; a `TxHandle` IS that connection for its lifetime.

mod error;
mod memory;
mod types;

use std::time::Instant;

use crate::transaction::IsolationLevel;

// Re-export public API
pub use error::{DriverError, DriverResult};
pub use memory::MemoryDriver;
pub use types::{InvalidNameError, Row, RowKey, TableName};

/// Connection-pool-level entry point of a persistence driver.
///
/// Implementations are shared behind `Arc<dyn Driver>` and must hand out an
/// independent [`TxHandle`] per `begin` call.
pub trait Driver: Send + Sync {
    /// Open a transaction at the given isolation level.
    ///
    /// The returned handle owns one pooled connection until it is resolved
    /// by `commit` or `rollback`.
    fn begin(&self, isolation: IsolationLevel) -> DriverResult<Box<dyn TxHandle>>;
}

/// An open database transaction.
///
/// All statement methods take `&mut self`: a transaction is a single
/// serialized statement stream, whatever concurrency the caller layers on
/// top. `commit`/`rollback` consume the handle so a resolved transaction
/// cannot be touched again.
pub trait TxHandle: Send {
    /// Insert a new row. Fails with a constraint violation on duplicate
    /// primary key or unique-field collision.
    fn insert(&mut self, table: &TableName, row: Row) -> DriverResult<()>;

    /// Read a single row by key.
    fn get(&mut self, table: &TableName, key: &RowKey) -> DriverResult<Option<Row>>;

    /// Replace an existing row. Fails with `RowNotFound` if absent.
    fn update(&mut self, table: &TableName, row: Row) -> DriverResult<()>;

    /// Delete a row by key. Fails with `RowNotFound` if absent.
    fn delete(&mut self, table: &TableName, key: &RowKey) -> DriverResult<()>;

    /// Find the first row whose column `field` equals `value`.
    ///
    /// Deterministic: rows are matched in key order.
    fn find_by(
        &mut self,
        table: &TableName,
        field: &str,
        value: &serde_json::Value,
    ) -> DriverResult<Option<Row>>;

    /// Scan all rows of a table in key order.
    fn scan(&mut self, table: &TableName) -> DriverResult<Vec<Row>>;

    /// Issue `SAVEPOINT <name>`.
    fn savepoint(&mut self, name: &str) -> DriverResult<()>;

    /// Issue `RELEASE SAVEPOINT <name>`.
    fn release_savepoint(&mut self, name: &str) -> DriverResult<()>;

    /// Issue `ROLLBACK TO SAVEPOINT <name>`. The transaction stays open.
    fn rollback_to_savepoint(&mut self, name: &str) -> DriverResult<()>;

    /// Arm (or clear) the driver-level statement deadline.
    ///
    /// Any statement executed past the deadline fails with
    /// [`DriverError::StatementTimeout`]. This is the driver's native
    /// statement/transaction timeout, not a timer race: the transaction is
    /// always resolved through the normal rollback path.
    fn set_deadline(&mut self, deadline: Option<Instant>);

    /// Commit the transaction and return the connection to the pool.
    fn commit(self: Box<Self>) -> DriverResult<()>;

    /// Roll back the transaction and return the connection to the pool.
    fn rollback(self: Box<Self>) -> DriverResult<()>;
}
