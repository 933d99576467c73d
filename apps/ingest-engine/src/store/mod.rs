//! Persistence port for the ETL core.
//!
//! The core only requires a small contract from its store: a scoped
//! transaction, a batch upsert keyed on `(coin_id, source)`, appends for raw
//! records and run history, an in-place checkpoint upsert, and simple
//! read-side queries. Two adapters implement it: [`SqliteStore`] (sqlx) for
//! production and [`MemoryStore`] for tests and development.

mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{
    Checkpoint, Coin, CoinFilter, NewCoin, RawRecord, RunRecord, SourceStats,
};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection-level failure.
    #[error("database connection error: {0}")]
    Connection(String),

    /// Query execution failure.
    #[error("query error: {0}")]
    Query(String),

    /// Payload (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A scoped write transaction.
///
/// Writes are only visible after [`StoreTx::commit`]; dropping a transaction
/// without committing discards them.
#[async_trait]
pub trait StoreTx: Send {
    /// Append raw audit records.
    async fn insert_raw(&mut self, records: &[RawRecord]) -> Result<(), StoreError>;

    /// Batch-upsert normalized coins keyed on `(coin_id, source)`.
    ///
    /// Atomic per call through the enclosing transaction, however large the
    /// batch: existing rows get all mutable fields overwritten and
    /// `updated_at` advanced, new rows get `created_at = updated_at = now`.
    /// Returns the number of rows written.
    async fn upsert_coins(&mut self, coins: &[NewCoin]) -> Result<usize, StoreError>;

    /// Insert or overwrite the checkpoint row for `checkpoint.source`.
    async fn upsert_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Append one run history record.
    async fn insert_run(&mut self, run: &RunRecord) -> Result<(), StoreError>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Roll the transaction back.
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// The persistence port consumed by the runner, orchestrator and serving
/// layer.
#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a scoped transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Read the checkpoint row for one source.
    async fn get_checkpoint(&self, source: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Read all checkpoint rows.
    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError>;

    /// Read run history, newest first, optionally filtered by source.
    async fn list_runs(
        &self,
        source: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RunRecord>, StoreError>;

    /// Paginated, filtered coin query. Returns the page plus the total count.
    async fn query_coins(&self, filter: &CoinFilter) -> Result<(Vec<Coin>, u64), StoreError>;

    /// Per-source aggregates over the run log.
    async fn run_stats(&self) -> Result<Vec<SourceStats>, StoreError>;

    /// Connectivity probe for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}
