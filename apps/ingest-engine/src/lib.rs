// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::default_trait_access
    )
)]

//! Ingest Engine - Market-Data ETL Core Library
//!
//! Orchestrated extract/transform/load for cryptocurrency market data from
//! multiple sources (CoinGecko, CoinPaprika, local CSV exports) into one
//! normalized store, with durable per-source checkpoints and an append-only
//! run history.
//!
//! # Architecture
//!
//! - `ingestion`: per-source [`ingestion::Pipeline`] implementations plus the
//!   shared validation pass.
//! - `runner`: retry/backoff state machine executing one pipeline end to end
//!   inside a store transaction.
//! - `orchestrator`: source registry, bounded parallel fan-out, status
//!   projection. The only mutation path into ETL state.
//! - `store`: persistence port with SQLite (sqlx) and in-memory adapters.
//! - `service` / `server`: read-side queries and the axum HTTP surface.
//! - `scheduler`: periodic full-batch runs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Configuration loading and validation.
pub mod config;

/// Error taxonomy shared across the ETL core.
pub mod error;

/// Ingestion pipelines and validation.
pub mod ingestion;

/// Data model: coins, raw records, checkpoints, run history.
pub mod models;

/// Run coordination across sources.
pub mod orchestrator;

/// Token-bucket rate limiting.
pub mod rate_limit;

/// Retry/backoff run execution.
pub mod runner;

/// Periodic scheduling.
pub mod scheduler;

/// HTTP surface.
pub mod server;

/// Read-side query services.
pub mod service;

/// Persistence port and adapters.
pub mod store;

/// Tracing setup.
pub mod telemetry;

pub use config::{Config, ConfigError, load_config};
pub use error::{EtlError, ValidationError};
pub use ingestion::{CoinGeckoPipeline, CoinPaprikaPipeline, CsvPipeline, Pipeline};
pub use orchestrator::{Orchestrator, PipelineFactory};
pub use rate_limit::{RateLimiter, RateLimiterRegistry};
pub use runner::{RetryPolicy, Runner};
pub use server::{AppState, create_router};
pub use service::DataService;
pub use store::{MemoryStore, SqliteStore, Store, StoreError, StoreTx};
