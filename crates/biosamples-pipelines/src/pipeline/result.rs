//! Per-task results and the per-run summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of processing one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub identifier: String,
    /// Amendments applied, accessions assigned, or whatever the task counts
    pub change_count: usize,
    pub success: bool,
}

impl TaskResult {
    pub fn success(identifier: impl Into<String>, change_count: usize) -> Self {
        Self {
            identifier: identifier.into(),
            change_count,
            success: true,
        }
    }

    pub fn failure(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            change_count: 0,
            success: false,
        }
    }
}

/// Aggregate report for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records pulled from the source and submitted
    pub records_processed: u64,
    pub total_changes: u64,
    pub failed: u64,
    pub failed_identifiers: Vec<String>,
    /// Resubmissions made by a retrying run
    pub retries: u64,
}

impl RunSummary {
    pub fn succeeded(&self) -> u64 {
        self.records_processed.saturating_sub(self.failed)
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
