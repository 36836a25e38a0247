//! Failure classification and retry.
//!
//! Two pieces work together here: `classify` maps any failure onto the
//! closed [`ErrorKind`] taxonomy, and [`RetryExecutor`] re-invokes
//! idempotent-safe operations while the classification stays transient.
//! Everything downstream of the engine (HTTP handlers, CLI) renders errors
//! from the [`ErrorRecord`] the executor returns; raw driver text stops
//! here.
//!
//! # Usage
//!
//! The executor composes with the coordinator for operations known to be
//! idempotent-safe:
//!
//! ```ignore
//! use libretto::recovery::RetryExecutor;
//!
//! let executor = RetryExecutor::new(sink);
//! let stock = executor.execute_with_retry(
//!     || coordinator.run(|ctx| restock(ctx, &isbn, 5)),
//!     &audit,
//!     None,
//! )?;
//! ```

mod classify;
mod retry;

pub use classify::{classify, ErrorKind, ErrorRecord};
pub use retry::{RetryExecutor, RetryPolicy};
