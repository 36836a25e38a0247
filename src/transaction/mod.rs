//! Transaction coordination for the engine.
//!
//! This module wraps units of work in atomic database transactions. A unit
//! is a plain closure receiving `&TransactionContext`; the coordinator
//! opens the transaction, runs the unit (alone, in sequence, in parallel,
//! under a savepoint, or under a deadline), and guarantees resolution one
//! way or the other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TransactionCoordinator                      │
//! │  (run / run_sequential / run_parallel / savepoint / timeout)│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Transaction │       │  Isolation  │       │  AuditSink  │
//!  │  (Context)  │       │    Level    │       │ (co-commit) │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use libretto::transaction::{TransactionCoordinator, RunOptions};
//!
//! let coordinator = TransactionCoordinator::new(driver, sink);
//!
//! let id = coordinator.run(|ctx| {
//!     ctx.insert(&books, row)?;
//!     Ok(row_key)
//! })?;
//! ```

mod context;
mod coordinator;
mod isolation;

pub use context::TransactionContext;
pub use coordinator::{RunOptions, SendUnit, TransactionCoordinator, Unit};
pub use isolation::IsolationLevel;
