//! Audit entry types.
//!
//! An `AuditEntry` is a fact: it records a state-changing action at the
//! moment it happened and is never updated afterward. Entries are
//! constructed by the coordinator, the retry executor, and the batch
//! orchestrator, then handed to an [`AuditSink`](super::AuditSink) exactly
//! once.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of state transition an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A unit of work committed.
    Completed,
    /// A unit of work rolled back.
    Failed,
    /// A retried operation resolved (success after retries, or exhaustion).
    Retried,
    /// A record was created.
    Created,
    /// A record was updated.
    Updated,
    /// A record was deleted.
    Deleted,
    /// A batch run finished.
    BatchCompleted,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::Completed => "completed",
            AuditAction::Failed => "failed",
            AuditAction::Retried => "retried",
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Deleted => "deleted",
            AuditAction::BatchCompleted => "batch_completed",
        };
        write!(f, "{}", s)
    }
}

/// Caller identity propagated into every entry produced during a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Acting user, if authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Client IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Client user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditContext {
    /// Context for an authenticated user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Acting user (mirrors `context.user_id` when present).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// The recorded state transition.
    pub action: AuditAction,
    /// Kind of resource touched ("books", "transaction", ...).
    pub resource_type: String,
    /// Identifier of the touched resource.
    pub resource_id: String,
    /// State before the mutation, if captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    /// State after the mutation, if captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    /// Caller identity.
    #[serde(default)]
    pub context: AuditContext,
    /// Human-readable summary of what happened.
    pub description: String,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Construct an entry stamped with the current time.
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: None,
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            before: None,
            after: None,
            context: AuditContext::default(),
            description: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the caller identity (also fills `actor_id`).
    pub fn with_context(mut self, ctx: &AuditContext) -> Self {
        self.actor_id = ctx.user_id.clone();
        self.context = ctx.clone();
        self
    }

    /// Attach the before-state snapshot.
    pub fn with_before(mut self, before: Value) -> Self {
        self.before = Some(before);
        self
    }

    /// Attach the after-state snapshot.
    pub fn with_after(mut self, after: Value) -> Self {
        self.after = Some(after);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
