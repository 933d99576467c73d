//! Periodic ETL scheduling.
//!
//! A plain tokio interval loop running the orchestrator's full-batch entry
//! point. The first tick fires immediately, so `run_on_startup` is expressed
//! by whether the loop consumes that tick or skips it.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Scheduler settings.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    /// Minutes between full runs.
    pub interval_minutes: u64,
    /// Run once immediately instead of waiting a full interval.
    pub run_on_startup: bool,
    /// Fan out over the worker pool.
    pub parallel: bool,
}

/// Run `orchestrator.run_all` every interval, forever.
///
/// Intended to be spawned as a background task; dropping the task handle (or
/// aborting it) is the only way to stop the loop.
pub async fn run_scheduler(orchestrator: Orchestrator, schedule: Schedule) {
    info!(
        interval_minutes = schedule.interval_minutes,
        run_on_startup = schedule.run_on_startup,
        "scheduler started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(schedule.interval_minutes * 60));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately.
    interval.tick().await;
    if !schedule.run_on_startup {
        interval.tick().await;
    }

    loop {
        orchestrator.run_all(schedule.parallel).await;
        interval.tick().await;
    }
}
