//! Retry execution with bounded exponential backoff.
//!
//! `RetryExecutor` re-invokes an operation while the classifier reports a
//! transient failure, sleeping `min(base * factor^(attempt-1), max)` between
//! attempts. It is the one component allowed to transform an error's shape:
//! callers receive the taxonomy-mapped [`ErrorRecord`] once retries are
//! exhausted, and the record reflects the *last* observed classification
//! (later attempts can reclassify, and the final cause is the relevant one).
//!
//! Only operations known to be idempotent-safe belong here; the executor
//! cannot tell whether a half-applied operation is safe to repeat.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditAction, AuditContext, AuditEntry, AuditSink};
use crate::error::EngineResult;
use crate::recovery::classify::{classify, ErrorKind, ErrorRecord};

/// Immutable retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total invocation budget, first attempt included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling on the backoff curve.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Kinds worth retrying.
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            retryable_kinds: vec![
                ErrorKind::Deadlock,
                ErrorKind::Timeout,
                ErrorKind::ConnectionError,
            ],
        }
    }
}

impl RetryPolicy {
    /// Whether this policy retries the given kind.
    pub fn allows(&self, kind: ErrorKind) -> bool {
        self.retryable_kinds.contains(&kind)
    }

    /// Backoff delay before the retry that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

/// Re-invokes idempotent-safe operations under a backoff policy.
pub struct RetryExecutor {
    sink: Arc<dyn AuditSink>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Executor with the default policy.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            policy: RetryPolicy::default(),
        }
    }

    /// Executor with a custom default policy.
    pub fn with_policy(sink: Arc<dyn AuditSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Invoke `operation` up to `max_attempts` times.
    ///
    /// Non-transient failures stop the loop immediately; they are never
    /// retried, not even once. One summary audit entry records multi-attempt
    /// history (success after ≥2 attempts, or final failure); intermediate
    /// attempts are not separately audited to avoid flooding the trail.
    pub fn execute_with_retry<T, F>(
        &self,
        mut operation: F,
        audit: &AuditContext,
        policy_override: Option<&RetryPolicy>,
    ) -> Result<T, ErrorRecord>
    where
        F: FnMut() -> EngineResult<T>,
    {
        let policy = policy_override.unwrap_or(&self.policy);
        let op_id = ulid::Ulid::new().to_string().to_lowercase();
        let mut attempt: u32 = 1;

        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        self.audit_outcome(
                            &op_id,
                            audit,
                            format!("operation succeeded after {} attempts", attempt),
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let record = classify(err);
                    let exhausted = attempt >= policy.max_attempts;
                    if !policy.allows(record.kind) || exhausted {
                        self.audit_outcome(
                            &op_id,
                            audit,
                            format!(
                                "operation failed after {} attempt(s): {} (retryable: {})",
                                attempt, record.kind, record.retryable
                            ),
                        );
                        return Err(record);
                    }
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        attempt,
                        kind = %record.kind,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    fn audit_outcome(&self, op_id: &str, audit: &AuditContext, description: String) {
        let entry = AuditEntry::new(AuditAction::Retried, "operation", op_id)
            .with_context(audit)
            .with_description(description);
        if let Err(err) = self.sink.write(&entry, None) {
            tracing::warn!(op = op_id, error = %err, "retry audit write failed");
        }
    }
}
