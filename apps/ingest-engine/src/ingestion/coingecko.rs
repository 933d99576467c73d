//! CoinGecko markets API pipeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::error::EtlError;
use crate::models::{NewCoin, RawItem};
use crate::rate_limit::RateLimiter;

use super::validate::{CoinDraft, json_f64, json_i64, json_str};

/// Source name for checkpoint and run-history rows.
pub const SOURCE: &str = "coingecko";

/// Production API base.
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline for the CoinGecko `/coins/markets` endpoint.
pub struct CoinGeckoPipeline {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl CoinGeckoPipeline {
    /// Create a pipeline against `base_url`.
    ///
    /// The free tier needs no key; when one is configured it is sent as the
    /// `x-cg-demo-api-key` header.
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<String>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            limiter,
        }
    }
}

#[async_trait]
impl super::Pipeline for CoinGeckoPipeline {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn extract(&self) -> Result<Vec<RawItem>, EtlError> {
        self.limiter.wait(1).await;

        let mut request = self
            .client
            .get(format!("{}/coins/markets", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .query(&[
                ("vs_currency", "usd"),
                ("order", "market_cap_desc"),
                ("per_page", "100"),
                ("page", "1"),
                ("sparkline", "false"),
            ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let items: Vec<Value> = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EtlError::Extraction(e.to_string()))?
            .json()
            .await
            .map_err(|e| EtlError::Extraction(e.to_string()))?;

        Ok(items
            .into_iter()
            .map(|payload| RawItem::from_payload(payload, "id"))
            .collect())
    }

    fn transform(&self, raw: &[RawItem]) -> Vec<NewCoin> {
        let now = Utc::now();
        let mut normalized = Vec::with_capacity(raw.len());
        for item in raw {
            let payload = &item.payload;
            let draft = CoinDraft {
                coin_id: json_str(payload, "id"),
                symbol: json_str(payload, "symbol"),
                name: json_str(payload, "name"),
                current_price: json_f64(payload, "current_price"),
                market_cap: json_f64(payload, "market_cap"),
                volume_24h: json_f64(payload, "total_volume"),
                price_change_24h: json_f64(payload, "price_change_percentage_24h"),
                rank: json_i64(payload, "market_cap_rank"),
            };
            match draft.validate(SOURCE, now) {
                Ok(coin) => normalized.push(coin),
                Err(err) => warn!(
                    source = SOURCE,
                    error = %err,
                    payload = %payload,
                    "dropping record that failed validation"
                ),
            }
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::Pipeline;
    use serde_json::json;
    use std::num::NonZeroU32;

    fn pipeline() -> CoinGeckoPipeline {
        let limiter = Arc::new(RateLimiter::new(NonZeroU32::new(50).unwrap()));
        CoinGeckoPipeline::new(DEFAULT_BASE_URL, None, limiter)
    }

    #[test]
    fn test_transform_maps_market_fields() {
        let raw = vec![RawItem::from_payload(
            json!({
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "current_price": 97000.5,
                "market_cap": 1.9e12,
                "total_volume": 3.4e10,
                "price_change_percentage_24h": 1.2,
                "market_cap_rank": 1
            }),
            "id",
        )];

        let normalized = pipeline().transform(&raw);
        assert_eq!(normalized.len(), 1);
        let coin = &normalized[0];
        assert_eq!(coin.coin_id, "bitcoin");
        assert_eq!(coin.symbol, "BTC");
        assert_eq!(coin.source, "coingecko");
        assert_eq!(coin.current_price, Some(97000.5));
        assert_eq!(coin.volume_24h, Some(3.4e10));
        assert_eq!(coin.rank, Some(1));
    }

    #[test]
    fn test_transform_drops_invalid_items_only() {
        let raw = vec![
            RawItem::from_payload(
                json!({"id": "bitcoin", "symbol": "btc", "name": "Bitcoin"}),
                "id",
            ),
            // Missing symbol: dropped.
            RawItem::from_payload(json!({"id": "broken", "name": "Broken"}), "id"),
        ];

        let normalized = pipeline().transform(&raw);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].coin_id, "bitcoin");
    }
}
