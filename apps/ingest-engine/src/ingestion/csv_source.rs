//! Flat-file CSV pipeline.
//!
//! Lenient on purpose: header names vary between exports, numeric cells may
//! carry `$`/thousands separators, and a missing file is an empty batch (with
//! a warning) rather than an error.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::EtlError;
use crate::models::{NewCoin, RawItem};

use super::validate::CoinDraft;

/// Source name for checkpoint and run-history rows.
pub const SOURCE: &str = "csv";

/// Pipeline reading a local CSV file.
pub struct CsvPipeline {
    path: PathBuf,
}

impl CsvPipeline {
    /// Create a pipeline reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn first_field<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
        keys.iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
    }

    fn parse_float(value: Option<&str>) -> Option<f64> {
        value?
            .trim()
            .replace([',', '$'], "")
            .parse::<f64>()
            .ok()
    }

    fn parse_int(value: Option<&str>) -> Option<i64> {
        Self::parse_float(value).map(|v| v as i64)
    }
}

#[async_trait]
impl super::Pipeline for CsvPipeline {
    fn source(&self) -> &'static str {
        SOURCE
    }

    async fn extract(&self) -> Result<Vec<RawItem>, EtlError> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "CSV file not found, extracting empty batch");
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| EtlError::Extraction(e.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|e| EtlError::Extraction(e.to_string()))?
            .clone();

        let mut items = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| EtlError::Extraction(e.to_string()))?;
            let mut payload = Map::new();
            for (header, cell) in headers.iter().zip(record.iter()) {
                payload.insert(header.to_string(), Value::String(cell.to_string()));
            }
            let payload = Value::Object(payload);
            let coin_id = Self::first_field(&payload, &["coin_id", "id"])
                .unwrap_or("unknown")
                .to_string();
            items.push(RawItem { coin_id, payload });
        }
        Ok(items)
    }

    fn transform(&self, raw: &[RawItem]) -> Vec<NewCoin> {
        let now = Utc::now();
        let mut normalized = Vec::with_capacity(raw.len());
        for item in raw {
            let p = &item.payload;
            let draft = CoinDraft {
                coin_id: Self::first_field(p, &["coin_id", "id"])
                    .unwrap_or_default()
                    .to_string(),
                symbol: Self::first_field(p, &["symbol"]).unwrap_or_default().to_string(),
                name: Self::first_field(p, &["name"]).unwrap_or_default().to_string(),
                current_price: Self::parse_float(Self::first_field(p, &["price", "current_price"])),
                market_cap: Self::parse_float(Self::first_field(p, &["market_cap"])),
                volume_24h: Self::parse_float(Self::first_field(p, &["volume", "volume_24h"])),
                price_change_24h: Self::parse_float(Self::first_field(
                    p,
                    &["change_24h", "price_change_24h"],
                )),
                rank: Self::parse_int(Self::first_field(p, &["rank"])),
            };
            match draft.validate(SOURCE, now) {
                Ok(coin) => normalized.push(coin),
                Err(err) => warn!(
                    source = SOURCE,
                    error = %err,
                    payload = %p,
                    "dropping CSV record that failed validation"
                ),
            }
        }
        normalized
    }
}
