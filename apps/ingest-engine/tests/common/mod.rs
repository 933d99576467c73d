//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use ingest_engine::error::EtlError;
use ingest_engine::ingestion::{CoinDraft, Pipeline};
use ingest_engine::models::{
    Checkpoint, Coin, CoinFilter, NewCoin, RawItem, RunRecord, SourceStats,
};
use ingest_engine::store::{Store, StoreError, StoreTx};

/// Pipeline serving a fixed batch of payloads.
pub struct StaticPipeline {
    source: &'static str,
    payloads: Vec<Value>,
}

impl StaticPipeline {
    pub fn new(source: &'static str, payloads: Vec<Value>) -> Self {
        Self { source, payloads }
    }

    /// Two valid items.
    pub fn two_coins(source: &'static str) -> Self {
        Self::new(
            source,
            vec![
                json!({"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 97000.5, "rank": 1}),
                json!({"id": "ethereum", "symbol": "eth", "name": "Ethereum", "current_price": 3000.0, "rank": 2}),
            ],
        )
    }

    /// Two raw items of which one fails validation (missing symbol).
    pub fn one_valid_one_invalid(source: &'static str) -> Self {
        Self::new(
            source,
            vec![
                json!({"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 97000.5}),
                json!({"id": "broken", "name": "Broken Coin"}),
            ],
        )
    }
}

#[async_trait]
impl Pipeline for StaticPipeline {
    fn source(&self) -> &'static str {
        self.source
    }

    async fn extract(&self) -> Result<Vec<RawItem>, EtlError> {
        Ok(self
            .payloads
            .iter()
            .cloned()
            .map(|p| RawItem::from_payload(p, "id"))
            .collect())
    }

    fn transform(&self, raw: &[RawItem]) -> Vec<NewCoin> {
        let now = Utc::now();
        raw.iter()
            .filter_map(|item| {
                let p = &item.payload;
                let draft = CoinDraft {
                    coin_id: str_field(p, "id"),
                    symbol: str_field(p, "symbol"),
                    name: str_field(p, "name"),
                    current_price: p.get("current_price").and_then(Value::as_f64),
                    rank: p.get("rank").and_then(Value::as_i64),
                    ..Default::default()
                };
                draft.validate(self.source, now).ok()
            })
            .collect()
    }
}

/// Pipeline whose extract always fails, counting invocations.
pub struct FailingPipeline {
    source: &'static str,
    pub attempts: Arc<AtomicU32>,
}

impl FailingPipeline {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pipeline for FailingPipeline {
    fn source(&self) -> &'static str {
        self.source
    }

    async fn extract(&self) -> Result<Vec<RawItem>, EtlError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EtlError::Extraction("connection refused".to_string()))
    }

    fn transform(&self, _raw: &[RawItem]) -> Vec<NewCoin> {
        Vec::new()
    }
}

/// Store where every operation fails, as if the database were down.
pub struct OfflineStore;

fn offline() -> StoreError {
    StoreError::Connection("store offline".to_string())
}

#[async_trait]
impl Store for OfflineStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Err(offline())
    }

    async fn get_checkpoint(&self, _source: &str) -> Result<Option<Checkpoint>, StoreError> {
        Err(offline())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError> {
        Err(offline())
    }

    async fn list_runs(
        &self,
        _source: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<RunRecord>, StoreError> {
        Err(offline())
    }

    async fn query_coins(&self, _filter: &CoinFilter) -> Result<(Vec<Coin>, u64), StoreError> {
        Err(offline())
    }

    async fn run_stats(&self) -> Result<Vec<SourceStats>, StoreError> {
        Err(offline())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(offline())
    }
}

fn str_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
