//! ETL bookkeeping rows: per-source checkpoints and the append-only run log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current believed state of a source's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// A run is currently in flight.
    Running,
    /// The most recent run succeeded.
    Success,
    /// The most recent run exhausted its retries.
    Failure,
}

impl CheckpointStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Final outcome of one top-level run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run committed successfully.
    Success,
    /// The run exhausted its retries.
    Failure,
}

impl RunStatus {
    /// Stable string form used in the store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parse the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Durable per-source state, one row per source, mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Source name, unique.
    pub source: String,
    /// When the source last started a run.
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the source last completed successfully.
    pub last_success_at: Option<DateTime<Utc>>,
    /// When the source last exhausted its retries.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Current believed state.
    pub status: CheckpointStatus,
    /// Records processed by the most recent run.
    pub records_processed: i64,
    /// Error message from the most recent failure, cleared on success.
    pub error_message: Option<String>,
}

/// Immutable log entry for one top-level run (not per retry attempt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Fresh identity per `run()` invocation.
    pub run_id: String,
    /// Source name.
    pub source: String,
    /// Final outcome.
    pub status: RunStatus,
    /// Records processed over the whole run.
    pub records_processed: i64,
    /// Wall-clock duration from first attempt to completion.
    pub duration_seconds: f64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed.
    pub completed_at: DateTime<Utc>,
    /// Error message when the run failed.
    pub error_message: Option<String>,
}

/// Projection of a [`Checkpoint`] for external health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointView {
    /// When the source last started a run.
    pub last_run: Option<DateTime<Utc>>,
    /// When the source last completed successfully.
    pub last_success: Option<DateTime<Utc>>,
    /// When the source last exhausted its retries.
    pub last_failure: Option<DateTime<Utc>>,
    /// Current believed state.
    pub status: CheckpointStatus,
    /// Records processed by the most recent run.
    pub records_processed: i64,
    /// Error message from the most recent failure.
    pub error_message: Option<String>,
}

impl From<Checkpoint> for CheckpointView {
    fn from(cp: Checkpoint) -> Self {
        Self {
            last_run: cp.last_run_at,
            last_success: cp.last_success_at,
            last_failure: cp.last_failure_at,
            status: cp.status,
            records_processed: cp.records_processed,
            error_message: cp.error_message,
        }
    }
}

/// Aggregated run statistics for one source, derived from the run log.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    /// Source name.
    pub source: String,
    /// Total runs recorded.
    pub total_runs: i64,
    /// Sum of records processed across all runs.
    pub records_processed: i64,
    /// Average duration of successful runs in seconds.
    pub average_duration_seconds: f64,
    /// Percentage of runs that succeeded.
    pub success_rate: f64,
    /// Most recent successful completion.
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent failed completion.
    pub last_failure: Option<DateTime<Utc>>,
}
