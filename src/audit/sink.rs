//! Audit sinks.
//!
//! The engine only ever talks to the [`AuditSink`] trait. The write either
//! participates in the caller's transaction (entry and mutation share fate)
//! or runs standalone, and standalone writes are best-effort: a failure is
//! the *sink caller's* problem to log, never a replacement for the original
//! business error.

use std::sync::Arc;

use crate::audit::entry::AuditEntry;
use crate::driver::{Driver, Row, RowKey};
use crate::error::{EngineError, EngineResult};
use crate::transaction::{IsolationLevel, TransactionContext};

/// Durable destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Persist one entry.
    ///
    /// With `ctx`, the write is issued through that open transaction and
    /// commits or rolls back with it. Without, the write is standalone.
    fn write(&self, entry: &AuditEntry, ctx: Option<&TransactionContext>) -> EngineResult<()>;
}

/// Sink that persists entries as rows of the `audit_log` table.
pub struct TableAuditSink {
    driver: Arc<dyn Driver>,
}

impl TableAuditSink {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    fn entry_row(entry: &AuditEntry) -> EngineResult<Row> {
        let value = serde_json::to_value(entry)
            .map_err(|e| EngineError::Audit(format!("entry serialization failed: {}", e)))?;
        Row::from_value(RowKey::generate(), value)
            .map_err(|_| EngineError::Audit("entry did not serialize to an object".to_string()))
    }
}

impl AuditSink for TableAuditSink {
    fn write(&self, entry: &AuditEntry, ctx: Option<&TransactionContext>) -> EngineResult<()> {
        let row = Self::entry_row(entry)?;
        let table = crate::catalog::audit_log();
        match ctx {
            Some(ctx) => ctx
                .insert(&table, row)
                .map_err(|e| EngineError::Audit(e.to_string())),
            None => {
                // standalone: a private single-statement transaction
                let mut handle = self
                    .driver
                    .begin(IsolationLevel::ReadCommitted)
                    .map_err(|e| EngineError::Audit(e.to_string()))?;
                handle
                    .insert(&table, row)
                    .map_err(|e| EngineError::Audit(e.to_string()))?;
                handle
                    .commit()
                    .map_err(|e| EngineError::Audit(e.to_string()))
            }
        }
    }
}
