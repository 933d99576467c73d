//! Drives one pipeline through extract → load-raw → transform → load-normalized
//! with retry, backoff and checkpoint/run-history bookkeeping.
//!
//! One `run_id` is generated per top-level [`Runner::run`] invocation, not per
//! retry attempt, and exactly one run record is appended per invocation
//! whether it succeeded or exhausted its retries. `run` never surfaces an
//! error past its boundary: all failure is represented in checkpoint/run state
//! and the returned boolean.
//!
//! The backoff law is `backoff_base^attempt` seconds, exponential with no
//! jitter and no cap. Large `max_retries` values therefore accept unbounded
//! total wait growth; only delays that overflow a `Duration` saturate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::EtlError;
use crate::ingestion::Pipeline;
use crate::models::{Checkpoint, CheckpointStatus, RunRecord, RunStatus};
use crate::store::{Store, StoreTx};

/// Retry configuration for one run.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the run is recorded as failed.
    pub max_retries: u32,
    /// Base of the exponential backoff; delay before retry `n` is
    /// `backoff_base^n` seconds.
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based).
    ///
    /// Values beyond what a [`Duration`] can represent saturate instead of
    /// panicking; `run` must stay infallible whatever the policy holds.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base.powi(attempt as i32).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Executes pipelines under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner {
    policy: RetryPolicy,
}

impl Runner {
    /// Create a runner with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run the full pipeline for one source.
    ///
    /// Returns `true` on success. On failure the checkpoint and run history
    /// carry the error; nothing is raised to the caller.
    pub async fn run(&self, pipeline: &dyn Pipeline, store: &dyn Store) -> bool {
        let source = pipeline.source();
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let mut records_processed: i64 = 0;
        let mut attempt: u32 = 0;
        let mut last_error: Option<String> = None;

        while attempt < self.policy.max_retries {
            info!(
                source,
                run_id = %run_id,
                attempt = attempt + 1,
                "starting ETL run"
            );

            match self
                .attempt(pipeline, store, &run_id, started_at, &mut records_processed)
                .await
            {
                Ok(()) => {
                    info!(
                        source,
                        run_id = %run_id,
                        records_processed,
                        "ETL run completed successfully"
                    );
                    return true;
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                    attempt += 1;
                    error!(
                        source,
                        run_id = %run_id,
                        attempt,
                        error = %err,
                        "ETL run attempt failed"
                    );

                    if attempt < self.policy.max_retries {
                        let delay = self.policy.delay(attempt);
                        info!(
                            source,
                            delay_secs = delay.as_secs_f64(),
                            "retrying after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        // Retries exhausted: best-effort finalization. A checkpoint-write
        // failure must not crash the caller or change the decided outcome.
        if let Err(err) = self
            .finalize_failure(
                store,
                source,
                &run_id,
                started_at,
                records_processed,
                last_error.as_deref(),
            )
            .await
        {
            error!(
                source,
                run_id = %run_id,
                error = %err,
                "failed to record run failure"
            );
        }
        false
    }

    /// One attempt: a full extract/load cycle inside a scoped transaction.
    async fn attempt(
        &self,
        pipeline: &dyn Pipeline,
        store: &dyn Store,
        run_id: &str,
        started_at: DateTime<Utc>,
        records_processed: &mut i64,
    ) -> Result<(), EtlError> {
        let source = pipeline.source();
        // Read the prior checkpoint before opening the write transaction so
        // the preserved timestamps don't race the pending writes.
        let existing = store.get_checkpoint(source).await?;
        let mut tx = store.begin().await?;

        match Self::attempt_inner(pipeline, tx.as_mut(), run_id, started_at, existing, records_processed)
            .await
        {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(source, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn attempt_inner(
        pipeline: &dyn Pipeline,
        tx: &mut dyn StoreTx,
        run_id: &str,
        started_at: DateTime<Utc>,
        existing: Option<Checkpoint>,
        records_processed: &mut i64,
    ) -> Result<(), EtlError> {
        let source = pipeline.source();

        let raw = pipeline.extract().await?;
        info!(source, records = raw.len(), "extracted records");

        pipeline.load_raw(tx, &raw).await?;

        let normalized = pipeline.transform(&raw);
        info!(source, records = normalized.len(), "transformed records");

        let written = tx.upsert_coins(&normalized).await?;
        *records_processed += written as i64;

        let now = Utc::now();
        tx.upsert_checkpoint(&Checkpoint {
            source: source.to_string(),
            last_run_at: Some(now),
            last_success_at: Some(now),
            last_failure_at: existing.and_then(|cp| cp.last_failure_at),
            status: CheckpointStatus::Success,
            records_processed: *records_processed,
            error_message: None,
        })
        .await?;

        let completed_at = Utc::now();
        tx.insert_run(&RunRecord {
            run_id: run_id.to_string(),
            source: source.to_string(),
            status: RunStatus::Success,
            records_processed: *records_processed,
            duration_seconds: duration_secs(started_at, completed_at),
            started_at,
            completed_at,
            error_message: None,
        })
        .await?;

        Ok(())
    }

    /// Record the failure in a fresh transaction after retries are exhausted.
    async fn finalize_failure(
        &self,
        store: &dyn Store,
        source: &str,
        run_id: &str,
        started_at: DateTime<Utc>,
        records_processed: i64,
        last_error: Option<&str>,
    ) -> Result<(), EtlError> {
        let map_err = |e: crate::store::StoreError| EtlError::Checkpoint(e.to_string());

        let existing = store.get_checkpoint(source).await.map_err(map_err)?;
        let mut tx = store.begin().await.map_err(map_err)?;

        let now = Utc::now();
        tx.upsert_checkpoint(&Checkpoint {
            source: source.to_string(),
            last_run_at: Some(now),
            last_success_at: existing.and_then(|cp| cp.last_success_at),
            last_failure_at: Some(now),
            status: CheckpointStatus::Failure,
            records_processed,
            error_message: last_error.map(str::to_string),
        })
        .await
        .map_err(map_err)?;

        tx.insert_run(&RunRecord {
            run_id: run_id.to_string(),
            source: source.to_string(),
            status: RunStatus::Failure,
            records_processed,
            duration_seconds: duration_secs(started_at, now),
            started_at,
            completed_at: now,
            error_message: last_error.map(str::to_string),
        })
        .await
        .map_err(map_err)?;

        tx.commit().await.map_err(map_err)
    }
}

fn duration_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
