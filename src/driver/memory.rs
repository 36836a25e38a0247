//! In-memory reference driver.
//!
//! `MemoryDriver` is the executable specification of the driver contract:
//! snapshot at begin, write-set replay at commit, savepoint snapshots, unique
//! constraint enforcement with Postgres-style message texts, and a
//! per-statement deadline. The test suite runs against it; production
//! deployments bind the same traits to a real relational driver.
//!
//! Every transaction works on a full snapshot taken at `begin`, so the
//! driver provides snapshot semantics for all isolation levels. Commit
//! replays the transaction's write-set onto the shared store,
//! last-writer-wins per row.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::catalog::TableSpec;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::types::{Row, RowKey, TableName};
use crate::driver::{Driver, TxHandle};
use crate::transaction::IsolationLevel;

type Table = BTreeMap<RowKey, Row>;
type Store = HashMap<TableName, Table>;

struct StoreInner {
    tables: RwLock<Store>,
    /// unique columns per table, fixed at construction
    unique: HashMap<TableName, Vec<String>>,
}

/// In-memory driver backed by a shared table map.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct MemoryDriver {
    inner: Arc<StoreInner>,
}

impl MemoryDriver {
    /// Create a driver with the given table layout.
    pub fn new(schema: Vec<TableSpec>) -> Self {
        let mut tables = Store::new();
        let mut unique = HashMap::new();
        for spec in schema {
            tables.insert(spec.name.clone(), Table::new());
            unique.insert(spec.name, spec.unique);
        }
        Self {
            inner: Arc::new(StoreInner {
                tables: RwLock::new(tables),
                unique,
            }),
        }
    }

    /// Create a driver pre-loaded with the bookstore catalog schema.
    pub fn bookstore() -> Self {
        Self::new(crate::catalog::bookstore_schema())
    }

    /// Read a row from the committed state, outside any transaction.
    ///
    /// Test-suite convenience for post-commit assertions.
    pub fn read_committed(&self, table: &TableName, key: &RowKey) -> Option<Row> {
        self.inner.tables.read().get(table)?.get(key).cloned()
    }

    /// Number of rows in a table's committed state.
    pub fn committed_count(&self, table: &TableName) -> usize {
        self.inner
            .tables
            .read()
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// All committed rows of a table, in key order.
    pub fn committed_rows(&self, table: &TableName) -> Vec<Row> {
        self.inner
            .tables
            .read()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Driver for MemoryDriver {
    fn begin(&self, _isolation: IsolationLevel) -> DriverResult<Box<dyn TxHandle>> {
        let working = self.inner.tables.read().clone();
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.inner),
            working,
            writes: Vec::new(),
            savepoints: Vec::new(),
            deadline: None,
        }))
    }
}

/// One buffered mutation, replayed on commit.
#[derive(Debug, Clone)]
enum WriteOp {
    Put { table: TableName, row: Row },
    Delete { table: TableName, key: RowKey },
}

struct SavepointState {
    name: String,
    working: Store,
    writes_len: usize,
}

struct MemoryTx {
    shared: Arc<StoreInner>,
    /// private snapshot the transaction reads and mutates
    working: Store,
    /// buffered mutations, applied to the shared store on commit
    writes: Vec<WriteOp>,
    savepoints: Vec<SavepointState>,
    deadline: Option<Instant>,
}

impl MemoryTx {
    fn check_deadline(&self) -> DriverResult<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(DriverError::StatementTimeout);
            }
        }
        Ok(())
    }

    fn table(&self, table: &TableName) -> DriverResult<&Table> {
        self.working
            .get(table)
            .ok_or_else(|| DriverError::TableNotFound(table.clone()))
    }

    fn table_mut(&mut self, table: &TableName) -> DriverResult<&mut Table> {
        self.working
            .get_mut(table)
            .ok_or_else(|| DriverError::TableNotFound(table.clone()))
    }

    /// Enforce unique columns for `row`, skipping the row's own key.
    fn check_unique(&self, table: &TableName, row: &Row) -> DriverResult<()> {
        let Some(unique_cols) = self.shared.unique.get(table) else {
            return Ok(());
        };
        let rows = self.table(table)?;
        for col in unique_cols {
            let Some(candidate) = row.data.get(col) else {
                continue;
            };
            if candidate.is_null() {
                continue;
            }
            let collision = rows
                .values()
                .any(|existing| existing.key != row.key && existing.get(col) == Some(candidate));
            if collision {
                return Err(DriverError::unique_violation(table, col));
            }
        }
        Ok(())
    }
}

impl TxHandle for MemoryTx {
    fn insert(&mut self, table: &TableName, row: Row) -> DriverResult<()> {
        self.check_deadline()?;
        if self.table(table)?.contains_key(&row.key) {
            return Err(DriverError::pkey_violation(table, &row.key));
        }
        self.check_unique(table, &row)?;
        self.table_mut(table)?.insert(row.key.clone(), row.clone());
        self.writes.push(WriteOp::Put {
            table: table.clone(),
            row,
        });
        Ok(())
    }

    fn get(&mut self, table: &TableName, key: &RowKey) -> DriverResult<Option<Row>> {
        self.check_deadline()?;
        Ok(self.table(table)?.get(key).cloned())
    }

    fn update(&mut self, table: &TableName, row: Row) -> DriverResult<()> {
        self.check_deadline()?;
        if !self.table(table)?.contains_key(&row.key) {
            return Err(DriverError::RowNotFound {
                table: table.clone(),
                key: row.key.clone(),
            });
        }
        self.check_unique(table, &row)?;
        self.table_mut(table)?.insert(row.key.clone(), row.clone());
        self.writes.push(WriteOp::Put {
            table: table.clone(),
            row,
        });
        Ok(())
    }

    fn delete(&mut self, table: &TableName, key: &RowKey) -> DriverResult<()> {
        self.check_deadline()?;
        if self.table_mut(table)?.remove(key).is_none() {
            return Err(DriverError::RowNotFound {
                table: table.clone(),
                key: key.clone(),
            });
        }
        self.writes.push(WriteOp::Delete {
            table: table.clone(),
            key: key.clone(),
        });
        Ok(())
    }

    fn find_by(
        &mut self,
        table: &TableName,
        field: &str,
        value: &serde_json::Value,
    ) -> DriverResult<Option<Row>> {
        self.check_deadline()?;
        Ok(self
            .table(table)?
            .values()
            .find(|row| row.get(field) == Some(value))
            .cloned())
    }

    fn scan(&mut self, table: &TableName) -> DriverResult<Vec<Row>> {
        self.check_deadline()?;
        Ok(self.table(table)?.values().cloned().collect())
    }

    fn savepoint(&mut self, name: &str) -> DriverResult<()> {
        self.check_deadline()?;
        self.savepoints.push(SavepointState {
            name: name.to_string(),
            working: self.working.clone(),
            writes_len: self.writes.len(),
        });
        Ok(())
    }

    fn release_savepoint(&mut self, name: &str) -> DriverResult<()> {
        self.check_deadline()?;
        // RELEASE destroys the named savepoint and any nested after it
        let idx = self
            .savepoints
            .iter()
            .rposition(|sp| sp.name == name)
            .ok_or_else(|| DriverError::UnknownSavepoint(name.to_string()))?;
        self.savepoints.truncate(idx);
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> DriverResult<()> {
        self.check_deadline()?;
        let idx = self
            .savepoints
            .iter()
            .rposition(|sp| sp.name == name)
            .ok_or_else(|| DriverError::UnknownSavepoint(name.to_string()))?;
        // restore state, keep the savepoint itself (SQL semantics), drop nested ones
        self.working = self.savepoints[idx].working.clone();
        self.writes.truncate(self.savepoints[idx].writes_len);
        self.savepoints.truncate(idx + 1);
        Ok(())
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn commit(self: Box<Self>) -> DriverResult<()> {
        let MemoryTx { shared, writes, .. } = *self;
        let mut tables = shared.tables.write();
        for op in writes {
            match op {
                WriteOp::Put { table, row } => {
                    tables.entry(table).or_default().insert(row.key.clone(), row);
                }
                WriteOp::Delete { table, key } => {
                    if let Some(t) = tables.get_mut(&table) {
                        t.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> DriverResult<()> {
        // nothing reached the shared store, dropping the snapshot is enough
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> MemoryDriver {
        MemoryDriver::bookstore()
    }

    fn book_row(key: &str, title: &str, isbn: &str) -> Row {
        Row::from_value(
            RowKey::new(key).unwrap(),
            json!({"title": title, "isbn": isbn}),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();

        tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap();
        let row = tx.get(&books, &RowKey::new("b1").unwrap()).unwrap().unwrap();
        assert_eq!(row.get("title"), Some(&json!("Rayuela")));

        // not committed yet: invisible outside
        assert!(driver.read_committed(&books, &RowKey::new("b1").unwrap()).is_none());

        tx.commit().unwrap();
        assert!(driver.read_committed(&books, &RowKey::new("b1").unwrap()).is_some());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap();
        tx.rollback().unwrap();
        assert_eq!(driver.committed_count(&books), 0);
    }

    #[test]
    fn test_unique_constraint_message() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap();

        let err = tx.insert(&books, book_row("b2", "Otra", "111")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate key value violates unique constraint \"books_isbn_key\""
        );
    }

    #[test]
    fn test_duplicate_pkey() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap();
        let err = tx.insert(&books, book_row("b1", "Rayuela", "222")).unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn test_update_requires_existing_row() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        let err = tx.update(&books, book_row("ghost", "x", "y")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_savepoint_rollback_to() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();

        tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap();
        tx.savepoint("sp1").unwrap();
        tx.insert(&books, book_row("b2", "Otra", "222")).unwrap();
        tx.rollback_to_savepoint("sp1").unwrap();

        // b1 survives, b2 is gone
        assert!(tx.get(&books, &RowKey::new("b1").unwrap()).unwrap().is_some());
        assert!(tx.get(&books, &RowKey::new("b2").unwrap()).unwrap().is_none());

        tx.commit().unwrap();
        assert_eq!(driver.committed_count(&books), 1);
    }

    #[test]
    fn test_release_unknown_savepoint() {
        let driver = setup();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        let err = tx.release_savepoint("nope").unwrap_err();
        assert!(matches!(err, DriverError::UnknownSavepoint(_)));
    }

    #[test]
    fn test_deadline_times_out_statements() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        tx.set_deadline(Some(Instant::now() - std::time::Duration::from_millis(1)));
        let err = tx.insert(&books, book_row("b1", "Rayuela", "111")).unwrap_err();
        assert!(matches!(err, DriverError::StatementTimeout));
    }

    #[test]
    fn test_find_by_matches_in_key_order() {
        let driver = setup();
        let books = crate::catalog::books();
        let mut tx = driver.begin(IsolationLevel::ReadCommitted).unwrap();
        tx.insert(&books, book_row("a1", "Rayuela", "111")).unwrap();
        tx.insert(&books, book_row("a2", "Rayuela", "222")).unwrap();

        let hit = tx.find_by(&books, "title", &json!("Rayuela")).unwrap().unwrap();
        assert_eq!(hit.key, RowKey::new("a1").unwrap());
        assert!(tx.find_by(&books, "title", &json!("Nada")).unwrap().is_none());
    }
}
