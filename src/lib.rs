//! Libretto - Transactional Execution & Recovery Engine
//!
//! This crate is the hard kernel of a bookstore catalog service: it wraps
//! multi-step mutations in atomic transactions, classifies and retries
//! transient failures, runs partial-failure-tolerant bulk operations, and
//! guarantees that the audit record of every mutation commits atomically
//! with the mutation itself.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libretto::audit::TableAuditSink;
//! use libretto::driver::MemoryDriver;
//! use libretto::transaction::TransactionCoordinator;
//!
//! let driver = Arc::new(MemoryDriver::bookstore());
//! let sink = Arc::new(TableAuditSink::new(driver.clone()));
//! let coordinator = TransactionCoordinator::new(driver, sink);
//!
//! coordinator.run(|_ctx| {
//!     // every statement here commits or rolls back as one
//!     Ok(())
//! }).unwrap();
//! ```

pub mod audit;
pub mod batch;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod recovery;
pub mod transaction;

pub use error::{EngineError, EngineResult};
