//! Coin records: raw audit copies and the normalized store representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item as extracted from a source, before any validation.
///
/// The payload is kept opaque; only the source-assigned entity id is lifted
/// out so the raw audit row can be keyed without re-parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    /// Source-assigned entity id, `"unknown"` when the source omits one.
    pub coin_id: String,
    /// Unmodified payload as received from the source.
    pub payload: Value,
}

impl RawItem {
    /// Build a raw item, pulling the id from the given payload field.
    #[must_use]
    pub fn from_payload(payload: Value, id_field: &str) -> Self {
        let coin_id = payload
            .get(id_field)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Self { coin_id, payload }
    }
}

/// Append-only audit copy of one extracted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source the item was extracted from.
    pub source: String,
    /// Source-assigned entity id.
    pub coin_id: String,
    /// Unmodified payload.
    pub payload: Value,
    /// When the item was ingested.
    pub ingested_at: DateTime<Utc>,
}

/// A validated, normalized coin record ready for upsert.
///
/// Produced only by [`crate::ingestion::CoinDraft::validate`], which enforces
/// the field invariants (required ids, upper-cased symbol, negative numerics
/// clamped to `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCoin {
    /// Unique entity id within a source.
    pub coin_id: String,
    /// Ticker symbol, always upper-cased.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Current price in USD.
    pub current_price: Option<f64>,
    /// Market capitalization in USD.
    pub market_cap: Option<f64>,
    /// 24h trading volume in USD.
    pub volume_24h: Option<f64>,
    /// 24h price change percentage.
    pub price_change_24h: Option<f64>,
    /// Market cap rank.
    pub rank: Option<i64>,
    /// Source the record came from.
    pub source: String,
    /// Source-reported freshness timestamp.
    pub last_updated: DateTime<Utc>,
}

/// A normalized coin row as stored, unique on `(coin_id, source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// Surrogate row id.
    pub id: i64,
    /// Unique entity id within a source.
    pub coin_id: String,
    /// Ticker symbol, always upper-cased.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Current price in USD.
    pub current_price: Option<f64>,
    /// Market capitalization in USD.
    pub market_cap: Option<f64>,
    /// 24h trading volume in USD.
    pub volume_24h: Option<f64>,
    /// 24h price change percentage.
    pub price_change_24h: Option<f64>,
    /// Market cap rank.
    pub rank: Option<i64>,
    /// Source the record came from.
    pub source: String,
    /// Source-reported freshness timestamp.
    pub last_updated: DateTime<Utc>,
    /// When the row was first inserted.
    pub created_at: DateTime<Utc>,
    /// When the row was last written. Advanced on every upsert.
    pub updated_at: DateTime<Utc>,
}

/// Filter and pagination parameters for coin queries.
#[derive(Debug, Clone, Default)]
pub struct CoinFilter {
    /// Exact source match, already lower-cased.
    pub source: Option<String>,
    /// Exact symbol match, already upper-cased.
    pub symbol: Option<String>,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
}

impl CoinFilter {
    /// Row offset for the current page.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// One page of coin rows plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct CoinPage {
    /// Rows for this page, ordered by rank.
    pub coins: Vec<Coin>,
    /// Total rows matching the filter.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
}
