//! Transaction context.
//!
//! A `TransactionContext` is the engine's handle to one open database
//! transaction. The coordinator owns it for its whole lifetime: unit-of-work
//! closures only ever see `&TransactionContext`, and resolution
//! (commit/rollback) consumes the context by value, so a resolved
//! transaction cannot be touched again. The invariant is enforced by move
//! semantics instead of runtime state checks.

use std::collections::HashSet;
use std::time::Instant;

use parking_lot::Mutex;

use crate::driver::{DriverResult, Row, RowKey, TableName, TxHandle};
use crate::error::{EngineError, EngineResult};
use crate::transaction::isolation::IsolationLevel;

/// Handle to an open database transaction.
///
/// Statement methods take `&self`: the boxed driver handle sits behind a
/// mutex, which is what makes `run_parallel` possible at all. Concurrent
/// units share the context and the mutex serializes their statements (the
/// database sees one statement stream per transaction regardless).
pub struct TransactionContext {
    id: String,
    isolation: IsolationLevel,
    started_at: chrono::DateTime<chrono::Utc>,
    handle: Mutex<Box<dyn TxHandle>>,
    /// savepoint names used so far; names are single-use per transaction
    savepoints: Mutex<HashSet<String>>,
}

impl TransactionContext {
    pub(crate) fn new(handle: Box<dyn TxHandle>, isolation: IsolationLevel) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            isolation,
            started_at: chrono::Utc::now(),
            handle: Mutex::new(handle),
            savepoints: Mutex::new(HashSet::new()),
        }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// When the transaction started.
    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    // ==================== Statements ====================

    /// Insert a new row.
    pub fn insert(&self, table: &TableName, row: Row) -> EngineResult<()> {
        self.handle.lock().insert(table, row).map_err(Into::into)
    }

    /// Read a single row by key.
    pub fn get(&self, table: &TableName, key: &RowKey) -> EngineResult<Option<Row>> {
        self.handle.lock().get(table, key).map_err(Into::into)
    }

    /// Replace an existing row.
    pub fn update(&self, table: &TableName, row: Row) -> EngineResult<()> {
        self.handle.lock().update(table, row).map_err(Into::into)
    }

    /// Delete a row by key.
    pub fn delete(&self, table: &TableName, key: &RowKey) -> EngineResult<()> {
        self.handle.lock().delete(table, key).map_err(Into::into)
    }

    /// Find the first row whose column `field` equals `value`.
    pub fn find_by(
        &self,
        table: &TableName,
        field: &str,
        value: &serde_json::Value,
    ) -> EngineResult<Option<Row>> {
        self.handle
            .lock()
            .find_by(table, field, value)
            .map_err(Into::into)
    }

    /// Scan all rows of a table.
    pub fn scan(&self, table: &TableName) -> EngineResult<Vec<Row>> {
        self.handle.lock().scan(table).map_err(Into::into)
    }

    // ==================== Savepoints ====================

    /// Reserve a savepoint name, rejecting reuse within this transaction.
    pub(crate) fn register_savepoint(&self, name: &str) -> EngineResult<()> {
        if !self.savepoints.lock().insert(name.to_string()) {
            return Err(EngineError::SavepointReused {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn savepoint(&self, name: &str) -> EngineResult<()> {
        self.handle.lock().savepoint(name).map_err(Into::into)
    }

    pub(crate) fn release_savepoint(&self, name: &str) -> EngineResult<()> {
        self.handle.lock().release_savepoint(name).map_err(Into::into)
    }

    pub(crate) fn rollback_to_savepoint(&self, name: &str) -> EngineResult<()> {
        self.handle
            .lock()
            .rollback_to_savepoint(name)
            .map_err(Into::into)
    }

    // ==================== Resolution ====================

    /// Arm the driver-level statement deadline.
    pub(crate) fn set_deadline(&self, deadline: Option<Instant>) {
        self.handle.lock().set_deadline(deadline);
    }

    /// Commit, consuming the context.
    pub(crate) fn commit(self) -> DriverResult<()> {
        self.handle.into_inner().commit()
    }

    /// Roll back, consuming the context.
    pub(crate) fn rollback(self) -> DriverResult<()> {
        self.handle.into_inner().rollback()
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("started_at", &self.started_at)
            .finish()
    }
}
