//! HTTP extractor tests against a local mock server.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::num::NonZeroU32;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ingest_engine::error::EtlError;
use ingest_engine::ingestion::{CoinGeckoPipeline, CoinPaprikaPipeline, Pipeline};
use ingest_engine::rate_limit::RateLimiter;

fn limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(NonZeroU32::new(1000).unwrap()))
}

#[tokio::test]
async fn test_coingecko_extract_and_transform() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .and(query_param("vs_currency", "usd"))
        .and(query_param("order", "market_cap_desc"))
        .and(query_param("per_page", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "current_price": 97000.5,
                "market_cap": 1.9e12,
                "total_volume": 3.4e10,
                "price_change_percentage_24h": 1.2,
                "market_cap_rank": 1
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = CoinGeckoPipeline::new(&server.uri(), None, limiter());
    let raw = pipeline.extract().await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].coin_id, "bitcoin");

    let normalized = pipeline.transform(&raw);
    assert_eq!(normalized.len(), 1);
    assert_eq!(normalized[0].symbol, "BTC");
    assert_eq!(normalized[0].current_price, Some(97000.5));
}

#[tokio::test]
async fn test_coingecko_sends_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .and(header("x-cg-demo-api-key", "demo-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = CoinGeckoPipeline::new(&server.uri(), Some("demo-key".to_string()), limiter());
    let raw = pipeline.extract().await.unwrap();
    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_coingecko_server_error_fails_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pipeline = CoinGeckoPipeline::new(&server.uri(), None, limiter());
    let err = pipeline.extract().await.unwrap_err();
    assert!(matches!(err, EtlError::Extraction(_)));
}

#[tokio::test]
async fn test_coingecko_malformed_body_fails_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let pipeline = CoinGeckoPipeline::new(&server.uri(), None, limiter());
    assert!(pipeline.extract().await.is_err());
}

#[tokio::test]
async fn test_coinpaprika_extract_and_transform() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickers"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "eth-ethereum",
                "symbol": "eth",
                "name": "Ethereum",
                "rank": 2,
                "quotes": {
                    "USD": {
                        "price": 3021.4,
                        "market_cap": 3.6e11,
                        "volume_24h": 1.8e10,
                        "percent_change_24h": 0.8
                    }
                }
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = CoinPaprikaPipeline::new(&server.uri(), limiter());
    let raw = pipeline.extract().await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(raw[0].coin_id, "eth-ethereum");

    let normalized = pipeline.transform(&raw);
    assert_eq!(normalized.len(), 1);
    assert_eq!(normalized[0].current_price, Some(3021.4));
    assert_eq!(normalized[0].price_change_24h, Some(0.8));
    assert_eq!(normalized[0].rank, Some(2));
}

#[tokio::test]
async fn test_coinpaprika_server_error_fails_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let pipeline = CoinPaprikaPipeline::new(&server.uri(), limiter());
    assert!(matches!(
        pipeline.extract().await.unwrap_err(),
        EtlError::Extraction(_)
    ));
}
