//! Transaction isolation levels.
//!
//! The engine supports the three levels the catalog service actually uses:
//! - ReadCommitted: each statement sees the latest committed state
//! - RepeatableRead: all reads see the snapshot from transaction start
//! - Serializable: transactions behave as if executed one at a time
//!
//! The level is chosen per call and never silently escalated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Read Committed isolation.
    ///
    /// Each read sees the most recently committed data at the time of the
    /// read. Different reads within the same transaction might see different
    /// data if another transaction commits in between.
    #[default]
    ReadCommitted,

    /// Repeatable Read isolation (snapshot isolation).
    ///
    /// All reads within a transaction see a consistent snapshot of the
    /// database as of the transaction's start time.
    RepeatableRead,

    /// Serializable isolation.
    ///
    /// The strictest level: the database guarantees the outcome is
    /// equivalent to some serial execution order, aborting transactions
    /// that would violate it (those aborts classify as retryable).
    Serializable,
}

impl IsolationLevel {
    /// Get a human-readable description of this isolation level.
    pub fn description(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "Each read sees the latest committed data",
            IsolationLevel::RepeatableRead => {
                "All reads see a consistent snapshot from transaction start"
            }
            IsolationLevel::Serializable => {
                "Transactions behave as if executed serially"
            }
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE READ"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// Parse isolation level from string (SQL syntax).
impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ COMMITTED" | "READ_COMMITTED" | "READCOMMITTED" => {
                Ok(IsolationLevel::ReadCommitted)
            }
            "REPEATABLE READ" | "REPEATABLE_READ" | "REPEATABLEREAD" | "SNAPSHOT" => {
                Ok(IsolationLevel::RepeatableRead)
            }
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level: {}", s)),
        }
    }
}
