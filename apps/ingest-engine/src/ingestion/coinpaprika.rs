//! CoinPaprika tickers API pipeline.

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

use super::validate::{CoinDraft, json_i64, json_str};

/// Source name for checkpoint and run-history rows.
pub const SOURCE: &str = "coinpaprika";

/// Production API base. The free tier needs no authentication.
pub const DEFAULT_BASE_URL: &str = "https://api.coinpaprika.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline for the CoinPaprika `/tickers` endpoint.
pub struct CoinPaprikaPipeline {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl CoinPaprikaPipeline {
    /// Create a pipeline against `base_url`.
    #[must_use]
    pub fn new(base_url: &str, limiter: Arc<RateLimiter>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        }
    }
}

#[async_trait]
impl super::Pipeline for CoinPaprikaPipeline {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn extract(&self) -> Result<Vec<RawItem>, EtlError> {
        self.limiter.wait(1).await;

        let items: Vec<Value> = self
            .client
            .get(format!("{}/tickers", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .query(&[("limit", "100")])
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
            // USD quote block carries all the numeric fields.
            let quotes = payload
                .get("quotes")
                .and_then(|q| q.get("USD"))
                .cloned()
                .unwrap_or(Value::Null);

            let draft = CoinDraft {
                coin_id: json_str(payload, "id"),
                symbol: json_str(payload, "symbol"),
                name: json_str(payload, "name"),
                current_price: quotes.get("price").and_then(Value::as_f64),
                market_cap: quotes.get("market_cap").and_then(Value::as_f64),
                volume_24h: quotes.get("volume_24h").and_then(Value::as_f64),
                price_change_24h: quotes.get("percent_change_24h").and_then(Value::as_f64),
                rank: json_i64(payload, "rank"),
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
