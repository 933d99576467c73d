//! Per-record validation of candidate coin records.
//!
//! Validation rules:
//! - `coin_id`, `symbol` and `name` are required and non-empty
//! - the symbol is stored upper-cased
//! - negative numeric fields are clamped to `None`
//!
//! A record failing validation is dropped by its pipeline's transform and
//! logged with the offending payload; it never fails the whole batch.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::NewCoin;

/// Candidate coin record built by a pipeline's transform, before validation.
#[derive(Debug, Clone, Default)]
pub struct CoinDraft {
    /// Source-assigned entity id.
    pub coin_id: String,
    /// Ticker symbol in whatever case the source uses.
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
}

impl CoinDraft {
    /// Validate the draft into a normalized record for `source`.
    pub fn validate(
        self,
        source: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<NewCoin, ValidationError> {
        if self.coin_id.trim().is_empty() {
            return Err(ValidationError::MissingField("coin_id"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::MissingField("symbol"));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }

        Ok(NewCoin {
            coin_id: self.coin_id,
            symbol: self.symbol.to_uppercase(),
            name: self.name,
            current_price: clamp_negative(self.current_price),
            market_cap: clamp_negative(self.market_cap),
            volume_24h: clamp_negative(self.volume_24h),
            price_change_24h: clamp_negative(self.price_change_24h),
            rank: self.rank,
            source: source.to_string(),
            last_updated,
        })
    }
}

fn clamp_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0)
}

/// String field accessor for loosely-typed payloads.
pub(crate) fn json_str(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Numeric field accessor for loosely-typed payloads.
pub(crate) fn json_f64(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(Value::as_f64)
}

/// Integer field accessor for loosely-typed payloads.
pub(crate) fn json_i64(payload: &Value, key: &str) -> Option<i64> {
    payload.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> CoinDraft {
        CoinDraft {
            coin_id: "ethereum".to_string(),
            symbol: "eth".to_string(),
            name: "Ethereum".to_string(),
            current_price: Some(3000.0),
            market_cap: Some(4e11),
            volume_24h: Some(1e10),
            price_change_24h: Some(-2.5),
            rank: Some(2),
        }
    }

    #[test]
    fn test_symbol_uppercased() {
        let coin = draft().validate("coingecko", Utc::now()).unwrap();
        assert_eq!(coin.symbol, "ETH");
    }

    #[test]
    fn test_negative_price_clamped_to_none() {
        let mut d = draft();
        d.current_price = Some(-100.0);
        let coin = d.validate("coingecko", Utc::now()).unwrap();
        assert_eq!(coin.current_price, None);
    }

    #[test]
    fn test_negative_change_clamped_like_other_numerics() {
        let coin = draft().validate("coingecko", Utc::now()).unwrap();
        assert_eq!(coin.price_change_24h, None);
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let mut d = draft();
        d.coin_id = String::new();
        assert_eq!(
            d.validate("coingecko", Utc::now()),
            Err(ValidationError::MissingField("coin_id"))
        );

        let mut d = draft();
        d.symbol = "  ".to_string();
        assert_eq!(
            d.validate("coingecko", Utc::now()),
            Err(ValidationError::MissingField("symbol"))
        );

        let mut d = draft();
        d.name = String::new();
        assert_eq!(
            d.validate("coingecko", Utc::now()),
            Err(ValidationError::MissingField("name"))
        );
    }

    #[test]
    fn test_json_accessors() {
        let payload = json!({"id": "btc", "price": 4.5, "rank": 7, "null_field": null});
        assert_eq!(json_str(&payload, "id"), "btc");
        assert_eq!(json_str(&payload, "missing"), "");
        assert_eq!(json_f64(&payload, "price"), Some(4.5));
        assert_eq!(json_f64(&payload, "null_field"), None);
        assert_eq!(json_i64(&payload, "rank"), Some(7));
    }
}
