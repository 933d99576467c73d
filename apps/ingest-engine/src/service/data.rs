//! Coin listing and run-history queries.
//!
//! Normalizes caller-supplied filters before they reach the store: source is
//! matched case-insensitively by lowering, symbol by uppering (stored symbols
//! are always upper-cased), and pagination is clamped to sane bounds.

use std::sync::Arc;

use crate::models::{CoinFilter, CoinPage, RunRecord, SourceStats};
use crate::store::{Store, StoreError};

/// Page size applied when the caller doesn't pick one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Hard upper bound on rows per page.
pub const MAX_PAGE_SIZE: u32 = 250;

const DEFAULT_RUN_LIMIT: u32 = 20;
const MAX_RUN_LIMIT: u32 = 100;

/// Read-side facade over the store.
#[derive(Clone)]
pub struct DataService {
    store: Arc<dyn Store>,
}

impl DataService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// List coins matching the optional filters, ordered by rank.
    pub async fn list_coins(
        &self,
        source: Option<&str>,
        symbol: Option<&str>,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> Result<CoinPage, StoreError> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let filter = CoinFilter {
            source: source.map(str::to_lowercase),
            symbol: symbol.map(str::to_uppercase),
            page,
            page_size,
        };

        let (coins, total) = self.store.query_coins(&filter).await?;
        Ok(CoinPage {
            coins,
            total,
            page,
            page_size,
        })
    }

    /// Run history, newest first, optionally filtered by source.
    pub async fn list_runs(
        &self,
        source: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let limit = limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, MAX_RUN_LIMIT);
        let source = source.map(str::to_lowercase);
        self.store.list_runs(source.as_deref(), limit).await
    }

    /// Per-source aggregates over the run log.
    pub async fn run_stats(&self) -> Result<Vec<SourceStats>, StoreError> {
        self.store.run_stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCoin;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn coin(coin_id: &str, symbol: &str, source: &str, rank: i64) -> NewCoin {
        NewCoin {
            coin_id: coin_id.to_string(),
            symbol: symbol.to_string(),
            name: coin_id.to_string(),
            current_price: Some(1.0),
            market_cap: None,
            volume_24h: None,
            price_change_24h: None,
            rank: Some(rank),
            source: source.to_string(),
            last_updated: Utc::now(),
        }
    }

    async fn seeded_service() -> DataService {
        let store = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        tx.upsert_coins(&[
            coin("bitcoin", "BTC", "coingecko", 1),
            coin("ethereum", "ETH", "coingecko", 2),
            coin("btc-bitcoin", "BTC", "coinpaprika", 1),
        ])
        .await
        .unwrap();
        tx.commit().await.unwrap();
        DataService::new(store)
    }

    #[tokio::test]
    async fn test_filters_are_case_normalized() {
        let service = seeded_service().await;

        let page = service
            .list_coins(Some("CoinGecko"), Some("btc"), None, None)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.coins[0].coin_id, "bitcoin");
    }

    #[tokio::test]
    async fn test_pagination_clamps() {
        let service = seeded_service().await;

        let page = service.list_coins(None, None, Some(0), Some(0)).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.coins.len(), 1);
        assert_eq!(page.total, 3);

        let page = service
            .list_coins(None, None, None, Some(100_000))
            .await
            .unwrap();
        assert_eq!(page.page_size, MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_empty_second_page() {
        let service = seeded_service().await;

        let page = service.list_coins(None, None, Some(2), Some(10)).await.unwrap();
        assert!(page.coins.is_empty());
        assert_eq!(page.total, 3);
    }
}
