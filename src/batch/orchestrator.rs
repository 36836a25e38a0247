//! Batch orchestration.
//!
//! All three entry points (import, bulk update, bulk delete) run inside
//! one overarching coordinator transaction spanning every chunk: either the
//! whole batch commits or none of it does. The softer mode
//! (`continue_on_error`) wraps each row in a savepoint. A failed row rolls
//! back to its savepoint, gets captured in the report, and the batch keeps
//! going, committing whatever succeeded.
//!
//! Chunks and the rows inside them are processed strictly sequentially.
//! Find-or-create lookups (author/publisher/genre by name) have write-write
//! races under naive parallelism.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{AuditAction, AuditContext, AuditEntry};
use crate::batch::record::ImportRecord;
use crate::batch::report::BatchReport;
use crate::driver::{Row, RowKey, TableName};
use crate::error::{EngineError, EngineResult};
use crate::transaction::{RunOptions, TransactionContext, TransactionCoordinator};

/// Batch processing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Capture row failures and keep going instead of aborting the batch.
    pub continue_on_error: bool,
    /// Run validation and match detection only; mutate nothing.
    pub validate_only: bool,
    /// On a natural-key match, update the existing record instead of
    /// treating the row as a duplicate.
    pub update_existing: bool,
    /// Isolation for the enclosing transaction.
    pub isolation: crate::transaction::IsolationLevel,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            continue_on_error: false,
            validate_only: false,
            update_existing: false,
            isolation: crate::transaction::IsolationLevel::default(),
        }
    }
}

impl BatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    pub fn with_update_existing(mut self, update_existing: bool) -> Self {
        self.update_existing = update_existing;
        self
    }
}

/// One bulk-update patch: the target row plus the columns to change.
#[derive(Debug, Clone, Serialize)]
pub struct BookPatch {
    pub key: RowKey,
    pub changes: BTreeMap<String, Value>,
}

/// What one batch item did.
enum ItemOutcome {
    Created(String),
    Updated(String),
    Deleted(String),
    /// Passed a validate-only pass; nothing mutated.
    Validated,
}

/// Chunked bulk operations over the catalog.
pub struct BatchOrchestrator {
    coordinator: TransactionCoordinator,
}

impl BatchOrchestrator {
    pub fn new(coordinator: TransactionCoordinator) -> Self {
        Self { coordinator }
    }

    /// Import raw rows (bilingual field keys, see [`ImportRecord`]).
    ///
    /// Each row is validated (non-empty title, positive price), its lookup
    /// entities resolved find-or-create by name, and the book created, or
    /// updated when `update_existing` is set and a record matches by
    /// natural key (ISBN, else title). A match without `update_existing` is
    /// a row error.
    pub fn import(
        &self,
        rows: Vec<Value>,
        opts: &BatchOptions,
        audit: &AuditContext,
    ) -> EngineResult<BatchReport> {
        self.run_batch(rows, opts, audit, "batch import", |ctx, raw| {
            let record = ImportRecord::from_value(raw);
            record.validate().map_err(|msg| EngineError::validation(msg))?;
            if opts.validate_only {
                self.plan_import_row(ctx, &record, opts)
            } else {
                self.apply_import_row(ctx, &record, opts, audit)
            }
        })
    }

    /// Apply column patches to existing books.
    pub fn bulk_update(
        &self,
        patches: Vec<BookPatch>,
        opts: &BatchOptions,
        audit: &AuditContext,
    ) -> EngineResult<BatchReport> {
        let books = crate::catalog::books();
        self.run_batch(patches, opts, audit, "bulk update", |ctx, patch| {
            let row = self.fetch_book(ctx, &books, &patch.key)?;
            if opts.validate_only {
                return Ok(ItemOutcome::Validated);
            }
            let before = row.to_snapshot();
            let mut updated = row;
            updated.merge_data(patch.changes.clone());
            ctx.update(&books, updated.clone())?;
            self.audit_row(
                ctx,
                audit,
                AuditAction::Updated,
                &patch.key,
                Some(before),
                Some(updated.to_snapshot()),
                "batch: book updated",
            )?;
            Ok(ItemOutcome::Updated(patch.key.to_string()))
        })
    }

    /// Delete books by key.
    pub fn bulk_delete(
        &self,
        keys: Vec<RowKey>,
        opts: &BatchOptions,
        audit: &AuditContext,
    ) -> EngineResult<BatchReport> {
        let books = crate::catalog::books();
        self.run_batch(keys, opts, audit, "bulk delete", |ctx, key| {
            let row = self.fetch_book(ctx, &books, key)?;
            if opts.validate_only {
                return Ok(ItemOutcome::Validated);
            }
            ctx.delete(&books, key)?;
            self.audit_row(
                ctx,
                audit,
                AuditAction::Deleted,
                key,
                Some(row.to_snapshot()),
                None,
                "batch: book deleted",
            )?;
            Ok(ItemOutcome::Deleted(key.to_string()))
        })
    }

    /// Shared chunking loop: one overarching transaction, sequential
    /// chunks, sequential rows, per-row savepoints in continue mode, and
    /// the batch summary entry written through the same transaction.
    fn run_batch<I: Serialize>(
        &self,
        items: Vec<I>,
        opts: &BatchOptions,
        audit: &AuditContext,
        label: &str,
        apply: impl Fn(&TransactionContext, &I) -> EngineResult<ItemOutcome>,
    ) -> EngineResult<BatchReport> {
        let run_opts = RunOptions::new()
            .with_isolation(opts.isolation)
            .with_audit(audit.clone())
            .with_description(label);
        let chunk_size = opts.chunk_size.max(1);

        self.coordinator.run_with(run_opts, |ctx| {
            let mut report = BatchReport::new();
            for (chunk_idx, chunk) in items.chunks(chunk_size).enumerate() {
                tracing::debug!(batch = label, chunk = chunk_idx, rows = chunk.len(), "processing chunk");
                for (offset, item) in chunk.iter().enumerate() {
                    let row_no = chunk_idx * chunk_size + offset + 1;
                    let outcome = if opts.continue_on_error {
                        // a failed row rolls back to its savepoint, not the batch
                        self.coordinator.run_with_savepoint(
                            ctx,
                            &format!("batch_row_{}", row_no),
                            |ctx| apply(ctx, item),
                        )
                    } else {
                        apply(ctx, item)
                    };
                    match outcome {
                        Ok(ItemOutcome::Created(id)) => report.record_created(id),
                        Ok(ItemOutcome::Updated(id)) => report.record_updated(id),
                        Ok(ItemOutcome::Deleted(id)) => report.record_deleted(id),
                        Ok(ItemOutcome::Validated) => report.record_valid(),
                        Err(err) if opts.continue_on_error => {
                            let record = crate::recovery::classify(err);
                            tracing::debug!(row = row_no, error = %record, "batch row failed");
                            let input = serde_json::to_value(item).unwrap_or(Value::Null);
                            report.record_failure(row_no, input, record.message);
                        }
                        Err(err) => return Err(err),
                    }
                }
            }

            let entry = AuditEntry::new(AuditAction::BatchCompleted, "books", label)
                .with_context(audit)
                .with_description(format!("{}: {}", label, report.summary()));
            self.coordinator.sink().write(&entry, Some(ctx))?;
            tracing::info!(batch = label, summary = %report.summary(), "batch finished");
            Ok(report)
        })
    }

    /// Validate-only pass: detect what *would* happen, mutate nothing
    /// (including no find-or-create of lookup entities).
    fn plan_import_row(
        &self,
        ctx: &TransactionContext,
        record: &ImportRecord,
        opts: &BatchOptions,
    ) -> EngineResult<ItemOutcome> {
        let existing = self.find_book(ctx, record)?;
        if existing.is_some() && !opts.update_existing {
            return Err(EngineError::validation(already_exists(record)));
        }
        Ok(ItemOutcome::Validated)
    }

    fn apply_import_row(
        &self,
        ctx: &TransactionContext,
        record: &ImportRecord,
        opts: &BatchOptions,
        audit: &AuditContext,
    ) -> EngineResult<ItemOutcome> {
        let author_id = self.resolve_lookup(ctx, &crate::catalog::authors(), record.author.as_deref())?;
        let publisher_id =
            self.resolve_lookup(ctx, &crate::catalog::publishers(), record.publisher.as_deref())?;
        let genre_id = self.resolve_lookup(ctx, &crate::catalog::genres(), record.genre.as_deref())?;
        let data = record.to_book_data(
            author_id.as_ref().map(RowKey::as_str),
            publisher_id.as_ref().map(RowKey::as_str),
            genre_id.as_ref().map(RowKey::as_str),
        );
        let books = crate::catalog::books();

        match self.find_book(ctx, record)? {
            Some(existing) if opts.update_existing => {
                let before = existing.to_snapshot();
                let mut updated = existing;
                updated.merge_data(data);
                ctx.update(&books, updated.clone())?;
                self.audit_row(
                    ctx,
                    audit,
                    AuditAction::Updated,
                    &updated.key,
                    Some(before),
                    Some(updated.to_snapshot()),
                    "batch import: book updated",
                )?;
                Ok(ItemOutcome::Updated(updated.key.to_string()))
            }
            Some(_) => Err(EngineError::validation(already_exists(record))),
            None => {
                let key = RowKey::generate();
                let row = Row::new(key.clone(), data);
                let after = row.to_snapshot();
                ctx.insert(&books, row)?;
                self.audit_row(
                    ctx,
                    audit,
                    AuditAction::Created,
                    &key,
                    None,
                    Some(after),
                    "batch import: book created",
                )?;
                Ok(ItemOutcome::Created(key.to_string()))
            }
        }
    }

    /// Match a book by natural key: ISBN when present, else title.
    fn find_book(
        &self,
        ctx: &TransactionContext,
        record: &ImportRecord,
    ) -> EngineResult<Option<Row>> {
        let books = crate::catalog::books();
        match &record.isbn {
            Some(isbn) => ctx.find_by(&books, "isbn", &Value::from(isbn.clone())),
            None => ctx.find_by(&books, "title", &Value::from(record.title.clone())),
        }
    }

    /// Find-or-create a lookup entity by name.
    fn resolve_lookup(
        &self,
        ctx: &TransactionContext,
        table: &TableName,
        name: Option<&str>,
    ) -> EngineResult<Option<RowKey>> {
        let Some(name) = name else {
            return Ok(None);
        };
        if let Some(row) = ctx.find_by(table, "name", &Value::from(name))? {
            return Ok(Some(row.key));
        }
        let key = RowKey::generate();
        let mut data = BTreeMap::new();
        data.insert("name".to_string(), Value::from(name));
        ctx.insert(table, Row::new(key.clone(), data))?;
        Ok(Some(key))
    }

    fn fetch_book(
        &self,
        ctx: &TransactionContext,
        books: &TableName,
        key: &RowKey,
    ) -> EngineResult<Row> {
        ctx.get(books, key)?
            .ok_or_else(|| EngineError::validation(format!("book not found: {}", key)))
    }

    /// Row-level audit entry, written through the batch's transaction.
    #[allow(clippy::too_many_arguments)]
    fn audit_row(
        &self,
        ctx: &TransactionContext,
        audit: &AuditContext,
        action: AuditAction,
        key: &RowKey,
        before: Option<Value>,
        after: Option<Value>,
        description: &str,
    ) -> EngineResult<()> {
        let mut entry = AuditEntry::new(action, "books", key.as_str())
            .with_context(audit)
            .with_description(description);
        if let Some(before) = before {
            entry = entry.with_before(before);
        }
        if let Some(after) = after {
            entry = entry.with_after(after);
        }
        self.coordinator.sink().write(&entry, Some(ctx))
    }
}

fn already_exists(record: &ImportRecord) -> String {
    match &record.isbn {
        Some(isbn) => format!("book already exists: isbn {}", isbn),
        None => format!("book already exists: {}", record.title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TableAuditSink;
    use crate::driver::MemoryDriver;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (MemoryDriver, BatchOrchestrator) {
        let driver = MemoryDriver::bookstore();
        let sink = Arc::new(TableAuditSink::new(Arc::new(driver.clone())));
        let coordinator = TransactionCoordinator::new(Arc::new(driver.clone()), sink);
        (driver, BatchOrchestrator::new(coordinator))
    }

    fn five_rows_third_invalid() -> Vec<Value> {
        vec![
            json!({"titulo": "Rayuela", "precio": 12.5, "autor": "Julio Cortázar"}),
            json!({"titulo": "Ficciones", "precio": 9.9, "autor": "Jorge Luis Borges"}),
            json!({"titulo": "Gratis", "precio": 0}),
            json!({"titulo": "Pedro Páramo", "precio": 8.0, "autor": "Juan Rulfo"}),
            json!({"titulo": "El Aleph", "precio": 10.0, "autor": "Jorge Luis Borges"}),
        ]
    }

    #[test]
    fn test_row_isolation_with_continue_on_error() {
        let (driver, orchestrator) = setup();
        let opts = BatchOptions::new().with_continue_on_error(true);

        let report = orchestrator
            .import(five_rows_third_invalid(), &opts, &AuditContext::default())
            .unwrap();

        assert_eq!(report.total_processed(), 5);
        assert_eq!(report.successful(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.errors()[0].row, 3);
        assert_eq!(report.errors()[0].message, "price must be greater than zero");
        assert_eq!(report.errors()[0].input, json!({"titulo": "Gratis", "precio": 0}));
        assert_eq!(driver.committed_count(&crate::catalog::books()), 4);
    }

    #[test]
    fn test_all_or_nothing_is_the_default() {
        let (driver, orchestrator) = setup();

        let result = orchestrator.import(
            five_rows_third_invalid(),
            &BatchOptions::default(),
            &AuditContext::default(),
        );

        assert!(result.is_err());
        assert_eq!(driver.committed_count(&crate::catalog::books()), 0);
        assert_eq!(driver.committed_count(&crate::catalog::authors()), 0);
    }

    #[test]
    fn test_find_or_create_reuses_lookup_entities() {
        let (driver, orchestrator) = setup();
        let rows = vec![
            json!({"titulo": "Ficciones", "precio": 9.9, "autor": "Jorge Luis Borges"}),
            json!({"titulo": "El Aleph", "precio": 10.0, "autor": "Jorge Luis Borges"}),
        ];

        let report = orchestrator
            .import(rows, &BatchOptions::default(), &AuditContext::default())
            .unwrap();

        assert_eq!(report.created().len(), 2);
        assert_eq!(driver.committed_count(&crate::catalog::authors()), 1);

        let books = driver.committed_rows(&crate::catalog::books());
        assert_eq!(books[0].get("author_id"), books[1].get("author_id"));
    }

    #[test]
    fn test_duplicate_row_is_an_error_without_update_existing() {
        let (_driver, orchestrator) = setup();
        let opts = BatchOptions::new().with_continue_on_error(true);
        let rows = vec![
            json!({"titulo": "Rayuela", "precio": 12.5, "isbn": "111"}),
            json!({"titulo": "Rayuela 2a ed", "precio": 14.0, "isbn": "111"}),
        ];

        let report = orchestrator
            .import(rows, &opts, &AuditContext::default())
            .unwrap();

        assert_eq!(report.successful(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errors()[0].row, 2);
        assert!(report.errors()[0].message.contains("already exists"));
    }

    #[test]
    fn test_update_existing_matches_by_isbn() {
        let (driver, orchestrator) = setup();
        let first = vec![json!({"titulo": "Rayuela", "precio": 12.5, "isbn": "111"})];
        orchestrator
            .import(first, &BatchOptions::default(), &AuditContext::default())
            .unwrap();

        let second = vec![json!({"titulo": "Rayuela", "precio": 15.0, "isbn": "111"})];
        let report = orchestrator
            .import(
                second,
                &BatchOptions::new().with_update_existing(true),
                &AuditContext::default(),
            )
            .unwrap();

        assert_eq!(report.updated().len(), 1);
        assert_eq!(report.created().len(), 0);
        let books = driver.committed_rows(&crate::catalog::books());
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].get("price"), Some(&json!(15.0)));
        assert_eq!(books[0].version, 2);
    }

    #[test]
    fn test_validate_only_mutates_nothing() {
        let (driver, orchestrator) = setup();
        let opts = BatchOptions::new()
            .with_validate_only(true)
            .with_continue_on_error(true);

        let report = orchestrator
            .import(five_rows_third_invalid(), &opts, &AuditContext::default())
            .unwrap();

        assert_eq!(report.total_processed(), 5);
        assert_eq!(report.successful(), 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(driver.committed_count(&crate::catalog::books()), 0);
        assert_eq!(driver.committed_count(&crate::catalog::authors()), 0);
    }

    #[test]
    fn test_bulk_update_captures_missing_rows() {
        let (driver, orchestrator) = setup();
        let rows = vec![json!({"titulo": "Rayuela", "precio": 12.5, "isbn": "111"})];
        let report = orchestrator
            .import(rows, &BatchOptions::default(), &AuditContext::default())
            .unwrap();
        let key = RowKey::new(report.created()[0].clone()).unwrap();

        let mut changes = BTreeMap::new();
        changes.insert("price".to_string(), json!(20.0));
        let patches = vec![
            BookPatch { key: key.clone(), changes: changes.clone() },
            BookPatch { key: RowKey::new("ghost").unwrap(), changes },
        ];

        let report = orchestrator
            .bulk_update(
                patches,
                &BatchOptions::new().with_continue_on_error(true),
                &AuditContext::default(),
            )
            .unwrap();

        assert_eq!(report.updated(), &[key.to_string()]);
        assert_eq!(report.failed(), 1);
        assert!(report.errors()[0].message.contains("not found"));
        let updated = driver.read_committed(&crate::catalog::books(), &key).unwrap();
        assert_eq!(updated.get("price"), Some(&json!(20.0)));
    }

    #[test]
    fn test_bulk_delete_removes_rows_and_audits_before_state() {
        let (driver, orchestrator) = setup();
        let rows = vec![
            json!({"titulo": "Rayuela", "precio": 12.5, "isbn": "111"}),
            json!({"titulo": "Ficciones", "precio": 9.9, "isbn": "222"}),
        ];
        let report = orchestrator
            .import(rows, &BatchOptions::default(), &AuditContext::default())
            .unwrap();
        let keys: Vec<RowKey> = report
            .created()
            .iter()
            .map(|id| RowKey::new(id.clone()).unwrap())
            .collect();

        let report = orchestrator
            .bulk_delete(keys, &BatchOptions::default(), &AuditContext::default())
            .unwrap();

        assert_eq!(report.deleted().len(), 2);
        assert_eq!(driver.committed_count(&crate::catalog::books()), 0);
    }

    #[test]
    fn test_row_and_summary_audit_entries_commit_with_the_batch() {
        let (driver, orchestrator) = setup();
        let rows = vec![
            json!({"titulo": "Rayuela", "precio": 12.5}),
            json!({"titulo": "Ficciones", "precio": 9.9}),
        ];

        orchestrator
            .import(rows, &BatchOptions::default(), &AuditContext::default())
            .unwrap();

        // 2 row entries + 1 batch summary + the coordinator's completed entry
        assert_eq!(driver.committed_count(&crate::catalog::audit_log()), 4);
    }

    #[test]
    fn test_small_chunks_process_every_row() {
        let (driver, orchestrator) = setup();
        let rows: Vec<Value> = (1..=5)
            .map(|i| json!({"titulo": format!("Tomo {}", i), "precio": 5.0 + i as f64}))
            .collect();

        let report = orchestrator
            .import(
                rows,
                &BatchOptions::new().with_chunk_size(2),
                &AuditContext::default(),
            )
            .unwrap();

        assert_eq!(report.created().len(), 5);
        assert_eq!(driver.committed_count(&crate::catalog::books()), 5);
    }

    #[test]
    fn test_audit_context_propagates_to_entries() {
        let (driver, orchestrator) = setup();
        let audit = AuditContext::for_user("librarian-7");
        let rows = vec![json!({"titulo": "Rayuela", "precio": 12.5})];

        orchestrator
            .import(rows, &BatchOptions::default(), &audit)
            .unwrap();

        let entries = driver.committed_rows(&crate::catalog::audit_log());
        assert!(!entries.is_empty());
        for entry in entries {
            assert_eq!(entry.get("actor_id"), Some(&json!("librarian-7")));
        }
    }
}
