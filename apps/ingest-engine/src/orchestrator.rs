//! Coordinates ETL runs across all registered sources.
//!
//! The orchestrator owns the pipeline registry, the shared store handle, the
//! per-source rate limiter registry and the retry policy. It is the only
//! mutation path into ETL state; the HTTP layer and the scheduler both call
//! through it. Every entry point is infallible at the signature level:
//! failures land in checkpoints, run history and logs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::ingestion::Pipeline;
use crate::models::CheckpointView;
use crate::rate_limit::RateLimiterRegistry;
use crate::runner::{RetryPolicy, Runner};
use crate::store::Store;

/// Upper bound on concurrently running sources in parallel mode.
const MAX_PARALLEL_RUNS: usize = 3;

/// Builds a fresh pipeline for one source, pulling its limiter from the
/// shared registry.
pub type PipelineFactory = Arc<dyn Fn(&RateLimiterRegistry) -> Box<dyn Pipeline> + Send + Sync>;

/// Registry of sources plus the machinery to run them.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    limiters: Arc<RateLimiterRegistry>,
    runner: Runner,
    // Vec keeps registration order for sequential runs.
    pipelines: Vec<(String, PipelineFactory)>,
}

impl Orchestrator {
    /// Create an orchestrator with no registered sources.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, policy: RetryPolicy) -> Self {
        Self {
            store,
            limiters: Arc::new(RateLimiterRegistry::new()),
            runner: Runner::new(policy),
            pipelines: Vec::new(),
        }
    }

    /// Register a source. Re-registering a name replaces its factory while
    /// keeping the original position in the run order.
    pub fn register(&mut self, source: impl Into<String>, factory: PipelineFactory) {
        let source = source.into();
        if let Some(entry) = self.pipelines.iter_mut().find(|(name, _)| *name == source) {
            entry.1 = factory;
        } else {
            self.pipelines.push((source, factory));
        }
    }

    /// Names of all registered sources in registration order.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.pipelines.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Whether `source` is registered.
    #[must_use]
    pub fn has_source(&self, source: &str) -> bool {
        self.pipelines.iter().any(|(name, _)| name == source)
    }

    /// Run one source to completion.
    ///
    /// Unknown sources log a warning and return `false`; they write no
    /// checkpoint or run record.
    pub async fn run_single(&self, source: &str) -> bool {
        let Some((_, factory)) = self.pipelines.iter().find(|(name, _)| name == source) else {
            warn!(source, "run requested for unregistered source");
            return false;
        };
        let pipeline = factory(&self.limiters);
        self.runner.run(pipeline.as_ref(), self.store.as_ref()).await
    }

    /// Run every registered source, returning per-source outcomes.
    ///
    /// In parallel mode sources fan out over a pool of [`MAX_PARALLEL_RUNS`]
    /// permits; one source's failure or panic never cancels the others.
    /// Sequential mode runs sources one at a time in registration order.
    pub async fn run_all(&self, parallel: bool) -> HashMap<String, bool> {
        info!(
            sources = self.pipelines.len(),
            parallel, "starting ETL run for all sources"
        );
        let results = if parallel {
            self.run_all_parallel().await
        } else {
            self.run_all_sequential().await
        };
        let succeeded = results.values().filter(|ok| **ok).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "ETL run for all sources finished"
        );
        results
    }

    async fn run_all_sequential(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (source, factory) in &self.pipelines {
            let pipeline = factory(&self.limiters);
            let ok = self.runner.run(pipeline.as_ref(), self.store.as_ref()).await;
            results.insert(source.clone(), ok);
        }
        results
    }

    async fn run_all_parallel(&self) -> HashMap<String, bool> {
        // Seed every source with false so a panicked task still shows up as a
        // failed run in the result map.
        let mut results: HashMap<String, bool> = self
            .pipelines
            .iter()
            .map(|(source, _)| (source.clone(), false))
            .collect();

        let semaphore = Arc::new(Semaphore::new(MAX_PARALLEL_RUNS));
        let mut tasks = JoinSet::new();
        for (source, factory) in &self.pipelines {
            let source = source.clone();
            let factory = Arc::clone(factory);
            let limiters = Arc::clone(&self.limiters);
            let store = Arc::clone(&self.store);
            let runner = self.runner;
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // Semaphore never closes while we hold it, but a permit error
                // must not take down the whole batch either.
                let Ok(_permit) = semaphore.acquire().await else {
                    error!(source, "worker pool unavailable");
                    return (source, false);
                };
                let pipeline = factory(&limiters);
                let ok = runner.run(pipeline.as_ref(), store.as_ref()).await;
                (source, ok)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, ok)) => {
                    results.insert(source, ok);
                }
                Err(err) => {
                    error!(error = %err, "ETL task panicked");
                }
            }
        }
        results
    }

    /// Checkpoint projection for every source that has ever run.
    ///
    /// Store failures degrade to an empty map with an error log.
    pub async fn get_status(&self) -> HashMap<String, CheckpointView> {
        match self.store.list_checkpoints().await {
            Ok(checkpoints) => checkpoints
                .into_iter()
                .map(|cp| (cp.source.clone(), CheckpointView::from(cp)))
                .collect(),
            Err(err) => {
                error!(error = %err, "failed to read ETL checkpoints");
                HashMap::new()
            }
        }
    }

    /// Shared store handle for the read side.
    #[must_use]
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }
}
