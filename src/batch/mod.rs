//! Bulk operations over the catalog.
//!
//! The orchestrator turns a large list of logical rows into chunked work
//! inside one coordinator-managed transaction, with two failure modes:
//! abort-all (the default) and continue-on-error (row failures captured
//! per item, the rest commits).
//!
//! # Usage
//!
//! ```ignore
//! use libretto::batch::{BatchOrchestrator, BatchOptions};
//!
//! let orchestrator = BatchOrchestrator::new(coordinator);
//! let report = orchestrator.import(
//!     rows,
//!     &BatchOptions::new().with_continue_on_error(true),
//!     &audit,
//! )?;
//! println!("{}", report.summary());
//! ```

mod orchestrator;
mod record;
mod report;

pub use orchestrator::{BatchOptions, BatchOrchestrator, BookPatch};
pub use record::ImportRecord;
pub use report::{BatchItemError, BatchReport};
