//! Ingestion pipelines: the per-source extract/transform/load contract.
//!
//! A [`Pipeline`] covers one source. `extract` performs the rate-limited
//! retrieval, `transform` is a pure per-item validation pass, and `load_raw`
//! (default implementation) persists the unmodified audit copy of every
//! extracted item. The normalized batch upsert is a shared runner concern,
//! not part of the per-source contract.

mod coingecko;
mod coinpaprika;
mod csv_source;
mod validate;

use async_trait::async_trait;
use chrono::Utc;

pub use coingecko::{
    CoinGeckoPipeline, DEFAULT_BASE_URL as COINGECKO_BASE_URL, SOURCE as COINGECKO_SOURCE,
};
pub use coinpaprika::{
    CoinPaprikaPipeline, DEFAULT_BASE_URL as COINPAPRIKA_BASE_URL, SOURCE as COINPAPRIKA_SOURCE,
};
pub use csv_source::{CsvPipeline, SOURCE as CSV_SOURCE};
pub use validate::CoinDraft;

use crate::error::EtlError;
use crate::models::{NewCoin, RawItem, RawRecord};
use crate::store::StoreTx;

/// One source's extract/transform/load-raw contract.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Logical source name; the join key for checkpoints and run history.
    fn source(&self) -> &'static str;

    /// Retrieve the current batch from the external system.
    ///
    /// Rate-limited by the pipeline's own limiter. All-or-nothing: any
    /// transport or decode problem fails the whole call with
    /// [`EtlError::Extraction`]. No side effects on persistent state.
    async fn extract(&self) -> Result<Vec<RawItem>, EtlError>;

    /// Pure per-item normalization. Items failing validation are dropped and
    /// logged individually; output order is input order minus dropped items.
    fn transform(&self, raw: &[RawItem]) -> Vec<NewCoin>;

    /// Persist the unmodified audit copy of each extracted item, independent
    /// of transform outcome.
    async fn load_raw(&self, tx: &mut dyn StoreTx, raw: &[RawItem]) -> Result<(), EtlError> {
        let now = Utc::now();
        let records: Vec<RawRecord> = raw
            .iter()
            .map(|item| RawRecord {
                source: self.source().to_string(),
                coin_id: item.coin_id.clone(),
                payload: item.payload.clone(),
                ingested_at: now,
            })
            .collect();
        tx.insert_raw(&records).await?;
        Ok(())
    }
}
