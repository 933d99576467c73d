//! In-memory store for testing and development.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Checkpoint, Coin, CoinFilter, NewCoin, RawRecord, RunRecord, RunStatus, SourceStats,
};

use super::{Store, StoreError, StoreTx};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    /// Keyed on `(coin_id, source)`.
    coins: HashMap<(String, String), Coin>,
    raw: Vec<RawRecord>,
    checkpoints: HashMap<String, Checkpoint>,
    runs: Vec<RunRecord>,
}

/// In-memory implementation of [`Store`].
///
/// Suitable for tests and development. Not for production use.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of raw audit rows (for test assertions).
    #[must_use]
    pub fn raw_count(&self) -> usize {
        self.read().raw.len()
    }

    /// Number of normalized coin rows (for test assertions).
    #[must_use]
    pub fn coin_count(&self) -> usize {
        self.read().coins.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Op {
    Raw(Vec<RawRecord>),
    Coins(Vec<NewCoin>),
    Checkpoint(Checkpoint),
    Run(RunRecord),
}

/// Buffered transaction over [`MemoryStore`]; ops apply atomically on commit.
struct MemoryTx {
    state: Arc<RwLock<State>>,
    ops: Vec<Op>,
}

impl State {
    fn apply(&mut self, op: Op) {
        match op {
            Op::Raw(records) => self.raw.extend(records),
            Op::Coins(coins) => {
                let now = Utc::now();
                for coin in coins {
                    let key = (coin.coin_id.clone(), coin.source.clone());
                    match self.coins.get_mut(&key) {
                        Some(existing) => {
                            existing.symbol = coin.symbol;
                            existing.name = coin.name;
                            existing.current_price = coin.current_price;
                            existing.market_cap = coin.market_cap;
                            existing.volume_24h = coin.volume_24h;
                            existing.price_change_24h = coin.price_change_24h;
                            existing.rank = coin.rank;
                            existing.last_updated = coin.last_updated;
                            existing.updated_at = now;
                        }
                        None => {
                            self.next_id += 1;
                            self.coins.insert(
                                key,
                                Coin {
                                    id: self.next_id,
                                    coin_id: coin.coin_id,
                                    symbol: coin.symbol,
                                    name: coin.name,
                                    current_price: coin.current_price,
                                    market_cap: coin.market_cap,
                                    volume_24h: coin.volume_24h,
                                    price_change_24h: coin.price_change_24h,
                                    rank: coin.rank,
                                    source: coin.source,
                                    last_updated: coin.last_updated,
                                    created_at: now,
                                    updated_at: now,
                                },
                            );
                        }
                    }
                }
            }
            Op::Checkpoint(cp) => {
                self.checkpoints.insert(cp.source.clone(), cp);
            }
            Op::Run(run) => self.runs.push(run),
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_raw(&mut self, records: &[RawRecord]) -> Result<(), StoreError> {
        self.ops.push(Op::Raw(records.to_vec()));
        Ok(())
    }

    async fn upsert_coins(&mut self, coins: &[NewCoin]) -> Result<usize, StoreError> {
        self.ops.push(Op::Coins(coins.to_vec()));
        Ok(coins.len())
    }

    async fn upsert_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.ops.push(Op::Checkpoint(checkpoint.clone()));
        Ok(())
    }

    async fn insert_run(&mut self, run: &RunRecord) -> Result<(), StoreError> {
        self.ops.push(Op::Run(run.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        for op in self.ops {
            state.apply(op);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            state: Arc::clone(&self.state),
            ops: Vec::new(),
        }))
    }

    async fn get_checkpoint(&self, source: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.read().checkpoints.get(source).cloned())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let mut checkpoints: Vec<Checkpoint> = self.read().checkpoints.values().cloned().collect();
        checkpoints.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(checkpoints)
    }

    async fn list_runs(
        &self,
        source: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let state = self.read();
        let mut runs: Vec<RunRecord> = state
            .runs
            .iter()
            .filter(|r| source.is_none_or(|s| r.source == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn query_coins(&self, filter: &CoinFilter) -> Result<(Vec<Coin>, u64), StoreError> {
        let state = self.read();
        let mut matched: Vec<Coin> = state
            .coins
            .values()
            .filter(|c| filter.source.as_deref().is_none_or(|s| c.source == s))
            .filter(|c| filter.symbol.as_deref().is_none_or(|s| c.symbol == s))
            .cloned()
            .collect();
        let total = matched.len() as u64;

        // Rank descending, unranked rows last (mirrors the SQLite ordering).
        matched.sort_by(|a, b| b.rank.cmp(&a.rank));
        let page: Vec<Coin> = matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();

        Ok((page, total))
    }

    async fn run_stats(&self) -> Result<Vec<SourceStats>, StoreError> {
        let state = self.read();
        let mut by_source: HashMap<&str, Vec<&RunRecord>> = HashMap::new();
        for run in &state.runs {
            by_source.entry(run.source.as_str()).or_default().push(run);
        }

        let mut stats: Vec<SourceStats> = by_source
            .into_iter()
            .map(|(source, runs)| {
                let total_runs = runs.len() as i64;
                let records_processed = runs.iter().map(|r| r.records_processed).sum();
                let successes: Vec<&&RunRecord> = runs
                    .iter()
                    .filter(|r| r.status == RunStatus::Success)
                    .collect();
                let average_duration_seconds = if successes.is_empty() {
                    0.0
                } else {
                    successes.iter().map(|r| r.duration_seconds).sum::<f64>()
                        / successes.len() as f64
                };
                let success_rate = successes.len() as f64 / runs.len() as f64 * 100.0;
                let last_success = successes.iter().map(|r| r.completed_at).max();
                let last_failure = runs
                    .iter()
                    .filter(|r| r.status == RunStatus::Failure)
                    .map(|r| r.completed_at)
                    .max();

                SourceStats {
                    source: source.to_string(),
                    total_runs,
                    records_processed,
                    average_duration_seconds,
                    success_rate,
                    last_success,
                    last_failure,
                }
            })
            .collect();
        stats.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckpointStatus;
    use chrono::Utc;

    fn coin(coin_id: &str, source: &str, rank: Option<i64>) -> NewCoin {
        NewCoin {
            coin_id: coin_id.to_string(),
            symbol: coin_id.to_uppercase(),
            name: coin_id.to_string(),
            current_price: Some(1.0),
            market_cap: None,
            volume_24h: None,
            price_change_24h: None,
            rank,
            source: source.to_string(),
            last_updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[coin("bitcoin", "coingecko", Some(1))])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let (rows, total) = store.query_coins(&CoinFilter {
            page: 1,
            page_size: 10,
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(total, 1);
        let created_at = rows[0].created_at;

        let mut updated = coin("bitcoin", "coingecko", Some(2));
        updated.name = "Bitcoin".to_string();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[updated]).await.unwrap();
        tx.commit().await.unwrap();

        let (rows, total) = store.query_coins(&CoinFilter {
            page: 1,
            page_size: 10,
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(total, 1, "same (coin_id, source) must not duplicate");
        assert_eq!(rows[0].name, "Bitcoin");
        assert_eq!(rows[0].rank, Some(2));
        assert_eq!(rows[0].created_at, created_at);
        assert!(rows[0].updated_at >= created_at);
    }

    #[tokio::test]
    async fn test_same_coin_different_sources_are_distinct_rows() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[coin("bitcoin", "coingecko", Some(1))])
            .await
            .unwrap();
        tx.upsert_coins(&[coin("bitcoin", "coinpaprika", Some(1))])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.coin_count(), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[coin("bitcoin", "coingecko", None)])
            .await
            .unwrap();
        tx.upsert_checkpoint(&Checkpoint {
            source: "coingecko".to_string(),
            last_run_at: Some(Utc::now()),
            last_success_at: None,
            last_failure_at: None,
            status: CheckpointStatus::Running,
            records_processed: 0,
            error_message: None,
        })
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.coin_count(), 0);
        assert!(store.get_checkpoint("coingecko").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_filters_and_ordering() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[
            coin("bitcoin", "coingecko", Some(1)),
            coin("ethereum", "coingecko", Some(2)),
            coin("tether", "coinpaprika", Some(3)),
            coin("mystery", "coingecko", None),
        ])
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let (rows, total) = store
            .query_coins(&CoinFilter {
                source: Some("coingecko".to_string()),
                symbol: None,
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows[0].rank, Some(2), "rank descending");
        assert_eq!(rows.last().unwrap().rank, None, "unranked rows last");

        let (rows, total) = store
            .query_coins(&CoinFilter {
                source: None,
                symbol: Some("TETHER".to_string()),
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].source, "coinpaprika");
    }
}
