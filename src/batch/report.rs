//! Batch results.
//!
//! `BatchReport` aggregates one batch run. Counters only move through the
//! `record_*` methods, so `successful + failed == total_processed` holds by
//! construction.

use serde::Serialize;
use serde_json::Value;

/// One failed item. Successful items are tracked only by count and by the
/// mutated entity's identifier in the `created`/`updated`/`deleted` lists.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    /// 1-based position in the submitted list.
    pub row: usize,
    /// The input as submitted, for operator triage.
    pub input: Value,
    /// Client-safe failure message.
    pub message: String,
}

/// Aggregate result of a batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    total_processed: usize,
    successful: usize,
    failed: usize,
    errors: Vec<BatchItemError>,
    created: Vec<String>,
    updated: Vec<String>,
    deleted: Vec<String>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_processed(&self) -> usize {
        self.total_processed
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn errors(&self) -> &[BatchItemError] {
        &self.errors
    }

    pub fn created(&self) -> &[String] {
        &self.created
    }

    pub fn updated(&self) -> &[String] {
        &self.updated
    }

    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    /// One-line summary for logs and audit descriptions.
    pub fn summary(&self) -> String {
        format!(
            "{} processed: {} succeeded ({} created, {} updated, {} deleted), {} failed",
            self.total_processed,
            self.successful,
            self.created.len(),
            self.updated.len(),
            self.deleted.len(),
            self.failed
        )
    }

    pub(crate) fn record_created(&mut self, id: String) {
        self.total_processed += 1;
        self.successful += 1;
        self.created.push(id);
    }

    pub(crate) fn record_updated(&mut self, id: String) {
        self.total_processed += 1;
        self.successful += 1;
        self.updated.push(id);
    }

    pub(crate) fn record_deleted(&mut self, id: String) {
        self.total_processed += 1;
        self.successful += 1;
        self.deleted.push(id);
    }

    /// A row that passed a validate-only run (no entity id to track).
    pub(crate) fn record_valid(&mut self) {
        self.total_processed += 1;
        self.successful += 1;
    }

    pub(crate) fn record_failure(&mut self, row: usize, input: Value, message: String) {
        self.total_processed += 1;
        self.failed += 1;
        self.errors.push(BatchItemError {
            row,
            input,
            message,
        });
    }
}
