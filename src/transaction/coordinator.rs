//! Transaction coordinator.
//!
//! The coordinator is the engine's main entry point. It owns the full
//! transaction lifecycle: begin, execute units of work, resolve
//! (commit/rollback), and keep the audit trail honest. The "completed"
//! entry is written through the same transaction as the mutation so both
//! commit or neither does, while the "failed" entry is written standalone
//! after rollback, best-effort.
//!
//! The coordinator never swallows or rewrites a unit's error: it only adds
//! transaction resolution and the audit side effect, then returns the error
//! unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{AuditAction, AuditContext, AuditEntry, AuditSink};
use crate::driver::Driver;
use crate::error::{EngineError, EngineResult};
use crate::transaction::context::TransactionContext;
use crate::transaction::isolation::IsolationLevel;

/// A unit of work executed within one transaction.
pub type Unit<'a, T> = Box<dyn FnOnce(&TransactionContext) -> EngineResult<T> + 'a>;

/// A unit of work that can be issued from another thread ([`TransactionCoordinator::run_parallel`]).
pub type SendUnit<'a, T> = Box<dyn FnOnce(&TransactionContext) -> EngineResult<T> + Send + 'a>;

/// Per-call options: isolation, caller identity, audit description.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Isolation level; never silently escalated.
    pub isolation: IsolationLevel,
    /// Caller identity propagated into every audit entry of the call.
    pub audit: AuditContext,
    /// Description recorded on the transaction-level audit entries.
    pub description: String,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Set the caller identity.
    pub fn with_audit(mut self, audit: AuditContext) -> Self {
        self.audit = audit;
        self
    }

    /// Set the audit description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn describe(&self) -> &str {
        if self.description.is_empty() {
            "unit of work"
        } else {
            &self.description
        }
    }
}

/// Coordinates transactions against one driver, with one audit sink.
///
/// Cheap to clone and share: both collaborators live behind `Arc`.
#[derive(Clone)]
pub struct TransactionCoordinator {
    driver: Arc<dyn Driver>,
    sink: Arc<dyn AuditSink>,
}

impl TransactionCoordinator {
    /// Create a coordinator over the given driver and audit sink.
    pub fn new(driver: Arc<dyn Driver>, sink: Arc<dyn AuditSink>) -> Self {
        Self { driver, sink }
    }

    /// The audit sink this coordinator writes through.
    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    /// Open a transaction at the given isolation level.
    fn begin(&self, isolation: IsolationLevel) -> EngineResult<TransactionContext> {
        let handle = self.driver.begin(isolation)?;
        let ctx = TransactionContext::new(handle, isolation);
        tracing::debug!(tx = ctx.id(), %isolation, "transaction begin");
        Ok(ctx)
    }

    /// Run one unit of work with default options.
    ///
    /// Opens a transaction, invokes `unit`. On success, the "completed"
    /// audit entry is written through the same transaction and the
    /// transaction commits. On failure, the transaction rolls back, a
    /// "failed" entry is written standalone (best-effort), and the unit's
    /// error is returned unchanged.
    pub fn run<T, F>(&self, unit: F) -> EngineResult<T>
    where
        F: FnOnce(&TransactionContext) -> EngineResult<T>,
    {
        self.run_with(RunOptions::default(), unit)
    }

    /// Run one unit of work with explicit options.
    pub fn run_with<T, F>(&self, opts: RunOptions, unit: F) -> EngineResult<T>
    where
        F: FnOnce(&TransactionContext) -> EngineResult<T>,
    {
        let ctx = self.begin(opts.isolation)?;
        self.resolve(ctx, &opts, unit)
    }

    /// Run several units strictly in order inside one transaction.
    ///
    /// The first failure stops the sequence and rolls back everything the
    /// earlier units did; atomicity spans the whole sequence.
    pub fn run_sequential<'a, T>(
        &self,
        units: Vec<Unit<'a, T>>,
        opts: RunOptions,
    ) -> EngineResult<Vec<T>> {
        self.run_with(opts, |ctx| {
            let mut results = Vec::with_capacity(units.len());
            for unit in units {
                results.push(unit(ctx)?);
            }
            Ok(results)
        })
    }

    /// Run several independent units concurrently inside one transaction.
    ///
    /// "Concurrently" means concurrent statement *issuance*: the context's
    /// handle mutex serializes individual statements, because a database
    /// transaction is a single statement stream whatever the driver claims.
    /// This is a convenience for independent sub-statements, not a
    /// throughput primitive.
    ///
    /// The result vector preserves input order regardless of completion
    /// order. If any unit fails, the transaction rolls back and the
    /// lowest-indexed error is surfaced.
    pub fn run_parallel<'a, T: Send>(
        &self,
        units: Vec<SendUnit<'a, T>>,
        opts: RunOptions,
    ) -> EngineResult<Vec<T>> {
        self.run_with(opts, |ctx| {
            let outcomes: Vec<EngineResult<T>> = std::thread::scope(|scope| {
                let handles: Vec<_> = units
                    .into_iter()
                    .map(|unit| scope.spawn(move || unit(ctx)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().unwrap_or_else(|_| {
                            Err(EngineError::Internal("unit of work panicked".to_string()))
                        })
                    })
                    .collect()
            });
            let mut results = Vec::with_capacity(outcomes.len());
            for outcome in outcomes {
                results.push(outcome?);
            }
            Ok(results)
        })
    }

    /// Run a unit under a named savepoint inside an already-open transaction.
    ///
    /// On success the savepoint is released; on failure the transaction is
    /// rolled back *to the savepoint* and stays open, and the caller decides
    /// whether to continue or abort the whole transaction. Savepoint names
    /// are single-use per transaction; reuse is a caller error.
    pub fn run_with_savepoint<T, F>(
        &self,
        ctx: &TransactionContext,
        name: &str,
        unit: F,
    ) -> EngineResult<T>
    where
        F: FnOnce(&TransactionContext) -> EngineResult<T>,
    {
        ctx.register_savepoint(name)?;
        ctx.savepoint(name)?;
        match unit(ctx) {
            Ok(value) => {
                ctx.release_savepoint(name)?;
                Ok(value)
            }
            Err(err) => {
                ctx.rollback_to_savepoint(name)?;
                Err(err)
            }
        }
    }

    /// Run one unit of work under a statement deadline.
    ///
    /// The deadline is armed at the driver level before the unit starts:
    /// any statement executed past it fails with the driver's timeout
    /// error, the unit unwinds, and the normal rollback path resolves the
    /// transaction. No timer race, no abandoned open transaction.
    pub fn run_with_timeout<T, F>(
        &self,
        timeout: Duration,
        opts: RunOptions,
        unit: F,
    ) -> EngineResult<T>
    where
        F: FnOnce(&TransactionContext) -> EngineResult<T>,
    {
        let ctx = self.begin(opts.isolation)?;
        ctx.set_deadline(Some(Instant::now() + timeout));
        self.resolve(ctx, &opts, unit)
    }

    /// Invoke the unit and resolve the transaction one way or the other.
    fn resolve<T, F>(&self, ctx: TransactionContext, opts: &RunOptions, unit: F) -> EngineResult<T>
    where
        F: FnOnce(&TransactionContext) -> EngineResult<T>,
    {
        let tx_id = ctx.id().to_string();
        match unit(&ctx) {
            Ok(value) => {
                let entry = AuditEntry::new(AuditAction::Completed, "transaction", tx_id.as_str())
                    .with_context(&opts.audit)
                    .with_description(opts.describe());
                if let Err(audit_err) = self.sink.write(&entry, Some(&ctx)) {
                    // entry and mutation share fate: no entry, no commit
                    self.rollback(ctx, &tx_id);
                    self.audit_failure(&tx_id, opts, &audit_err);
                    return Err(audit_err);
                }
                match ctx.commit() {
                    Ok(()) => {
                        tracing::debug!(tx = %tx_id, "transaction committed");
                        Ok(value)
                    }
                    Err(commit_err) => {
                        let err = EngineError::from(commit_err);
                        self.audit_failure(&tx_id, opts, &err);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                self.rollback(ctx, &tx_id);
                self.audit_failure(&tx_id, opts, &err);
                Err(err)
            }
        }
    }

    fn rollback(&self, ctx: TransactionContext, tx_id: &str) {
        if let Err(rollback_err) = ctx.rollback() {
            tracing::warn!(tx = tx_id, error = %rollback_err, "rollback failed");
        } else {
            tracing::debug!(tx = tx_id, "transaction rolled back");
        }
    }

    /// Record a rollback on the audit trail, best-effort.
    ///
    /// The transaction is gone, so the entry is written standalone; if even
    /// that fails we log and move on. An audit failure must never mask the
    /// original error.
    fn audit_failure(&self, tx_id: &str, opts: &RunOptions, err: &EngineError) {
        let entry = AuditEntry::new(AuditAction::Failed, "transaction", tx_id)
            .with_context(&opts.audit)
            .with_description(format!("{} failed: {}", opts.describe(), err));
        if let Err(sink_err) = self.sink.write(&entry, None) {
            tracing::warn!(tx = tx_id, error = %sink_err, "standalone audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TableAuditSink;
    use crate::driver::{MemoryDriver, Row, RowKey};
    use parking_lot::Mutex;
    use serde_json::json;

    fn setup() -> (MemoryDriver, TransactionCoordinator) {
        let driver = MemoryDriver::bookstore();
        let sink = Arc::new(TableAuditSink::new(Arc::new(driver.clone())));
        let coordinator = TransactionCoordinator::new(Arc::new(driver.clone()), sink);
        (driver, coordinator)
    }

    fn book(key: &str, title: &str) -> Row {
        Row::from_value(RowKey::new(key).unwrap(), json!({"title": title})).unwrap()
    }

    #[test]
    fn test_run_commits_mutation_and_audit_together() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        coordinator
            .run(|ctx| ctx.insert(&books, book("b1", "Rayuela")))
            .unwrap();

        assert_eq!(driver.committed_count(&books), 1);
        // the completed entry landed in the same commit
        assert_eq!(driver.committed_count(&crate::catalog::audit_log()), 1);
    }

    #[test]
    fn test_run_rolls_back_and_returns_error_unchanged() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        let err = coordinator
            .run(|ctx| {
                ctx.insert(&books, book("b1", "Rayuela"))?;
                Err::<(), _>(EngineError::business("no new books today"))
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "no new books today");
        assert_eq!(driver.committed_count(&books), 0);
        // the failed entry was written standalone after rollback
        assert_eq!(driver.committed_count(&crate::catalog::audit_log()), 1);
    }

    #[test]
    fn test_atomicity_across_multiple_writes() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        let result = coordinator.run(|ctx| {
            ctx.insert(&books, book("b1", "Rayuela"))?;
            ctx.insert(&books, book("b2", "Ficciones"))?;
            Err::<(), _>(EngineError::validation("abort after two writes"))
        });

        assert!(result.is_err());
        assert_eq!(driver.committed_count(&books), 0);
    }

    /// Sink wrapper that records which transaction each write was bound to.
    struct RecordingSink {
        inner: TableAuditSink,
        writes: Mutex<Vec<(AuditAction, Option<String>)>>,
    }

    impl AuditSink for RecordingSink {
        fn write(&self, entry: &AuditEntry, ctx: Option<&TransactionContext>) -> EngineResult<()> {
            self.writes
                .lock()
                .push((entry.action, ctx.map(|c| c.id().to_string())));
            self.inner.write(entry, ctx)
        }
    }

    #[test]
    fn test_completed_entry_is_written_through_the_transaction() {
        let driver = MemoryDriver::bookstore();
        let sink = Arc::new(RecordingSink {
            inner: TableAuditSink::new(Arc::new(driver.clone())),
            writes: Mutex::new(Vec::new()),
        });
        let coordinator = TransactionCoordinator::new(Arc::new(driver.clone()), sink.clone());
        let books = crate::catalog::books();

        coordinator
            .run(|ctx| ctx.insert(&books, book("b1", "Rayuela")))
            .unwrap();

        let writes = sink.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, AuditAction::Completed);
        assert!(writes[0].1.is_some(), "completed entry must be transactional");
    }

    #[test]
    fn test_failed_entry_is_written_standalone() {
        let driver = MemoryDriver::bookstore();
        let sink = Arc::new(RecordingSink {
            inner: TableAuditSink::new(Arc::new(driver.clone())),
            writes: Mutex::new(Vec::new()),
        });
        let coordinator = TransactionCoordinator::new(Arc::new(driver.clone()), sink.clone());

        let _ = coordinator.run(|_ctx| Err::<(), _>(EngineError::validation("nope")));

        let writes = sink.writes.lock();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, AuditAction::Failed);
        assert!(writes[0].1.is_none(), "failed entry must be standalone");
    }

    #[test]
    fn test_run_sequential_stops_at_first_failure() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();
        let third_ran = Arc::new(Mutex::new(false));
        let third_flag = third_ran.clone();

        let units: Vec<Unit<'_, ()>> = vec![
            Box::new(|ctx| ctx.insert(&books, book("b1", "Rayuela"))),
            Box::new(|_ctx| Err(EngineError::business("stop here"))),
            Box::new(move |_ctx| {
                *third_flag.lock() = true;
                Ok(())
            }),
        ];

        let err = coordinator
            .run_sequential(units, RunOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "stop here");
        assert!(!*third_ran.lock(), "unit after the failure must not start");
        assert_eq!(driver.committed_count(&books), 0);
    }

    #[test]
    fn test_run_sequential_returns_results_in_order() {
        let (_driver, coordinator) = setup();
        let units: Vec<Unit<'_, i32>> = vec![
            Box::new(|_| Ok(1)),
            Box::new(|_| Ok(2)),
            Box::new(|_| Ok(3)),
        ];
        let results = coordinator
            .run_sequential(units, RunOptions::default())
            .unwrap();
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[test]
    fn test_run_parallel_preserves_input_order() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        // later units finish first; the result vector must not care
        let units: Vec<SendUnit<'_, i32>> = vec![
            Box::new(|ctx| {
                std::thread::sleep(Duration::from_millis(30));
                ctx.insert(&books, book("b1", "Rayuela"))?;
                Ok(1)
            }),
            Box::new(|ctx| {
                std::thread::sleep(Duration::from_millis(10));
                ctx.insert(&books, book("b2", "Ficciones"))?;
                Ok(2)
            }),
            Box::new(|_ctx| Ok(3)),
        ];

        let results = coordinator
            .run_parallel(units, RunOptions::default())
            .unwrap();
        assert_eq!(results, vec![1, 2, 3]);
        assert_eq!(driver.committed_count(&books), 2);
    }

    #[test]
    fn test_run_parallel_failure_rolls_back_everything() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        let units: Vec<SendUnit<'_, ()>> = vec![
            Box::new(|ctx| ctx.insert(&books, book("b1", "Rayuela"))),
            Box::new(|_ctx| Err(EngineError::validation("bad unit"))),
        ];

        let err = coordinator
            .run_parallel(units, RunOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "bad unit");
        assert_eq!(driver.committed_count(&books), 0);
    }

    #[test]
    fn test_savepoint_partial_rollback_keeps_outer_transaction_committable() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        coordinator
            .run(|ctx| {
                // write A
                ctx.insert(&books, book("a", "Kept"))?;

                // failing write B under a savepoint
                let result = coordinator.run_with_savepoint(ctx, "sp_b", |ctx| {
                    ctx.insert(&books, book("b", "Discarded"))?;
                    Err::<(), _>(EngineError::business("b goes away"))
                });
                assert!(result.is_err());

                // outer transaction is still usable
                ctx.insert(&books, book("c", "AlsoKept"))
            })
            .unwrap();

        assert!(driver.read_committed(&books, &RowKey::new("a").unwrap()).is_some());
        assert!(driver.read_committed(&books, &RowKey::new("b").unwrap()).is_none());
        assert!(driver.read_committed(&books, &RowKey::new("c").unwrap()).is_some());
    }

    #[test]
    fn test_savepoint_name_reuse_is_caller_error() {
        let (_driver, coordinator) = setup();

        let result = coordinator.run(|ctx| {
            coordinator.run_with_savepoint(ctx, "sp", |_| Ok(()))?;
            coordinator.run_with_savepoint(ctx, "sp", |_| Ok(()))
        });

        assert!(matches!(
            result.unwrap_err(),
            EngineError::SavepointReused { .. }
        ));
    }

    #[test]
    fn test_run_with_timeout_fails_late_statements() {
        let (driver, coordinator) = setup();
        let books = crate::catalog::books();

        let err = coordinator
            .run_with_timeout(Duration::from_millis(10), RunOptions::default(), |ctx| {
                std::thread::sleep(Duration::from_millis(30));
                ctx.insert(&books, book("b1", "TooLate"))
            })
            .unwrap_err();

        assert!(err.to_string().contains("timeout"));
        assert_eq!(driver.committed_count(&books), 0);
    }
}
