//! Ingest Engine Binary
//!
//! Starts the market-data ETL engine: the HTTP API plus the periodic
//! scheduler.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ingest-engine [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: SQLite URL override (default from config)
//! - `PORT`: HTTP server port override
//! - `COINGECKO_API_KEY`: optional CoinGecko demo API key
//! - `RUST_LOG`: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use ingest_engine::config::{Config, load_config};
use ingest_engine::ingestion::{
    COINGECKO_SOURCE, COINPAPRIKA_SOURCE, CSV_SOURCE, CoinGeckoPipeline, CoinPaprikaPipeline,
    CsvPipeline,
};
use ingest_engine::orchestrator::Orchestrator;
use ingest_engine::runner::RetryPolicy;
use ingest_engine::scheduler::{Schedule, run_scheduler};
use ingest_engine::server::{AppState, create_router};
use ingest_engine::store::{SqliteStore, Store};
use ingest_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    info!(
        database = %config.database.url,
        port = config.server.port,
        "starting ingest engine"
    );

    let store = SqliteStore::connect(&config.database.url)
        .await
        .context("connecting to database")?;
    store.migrate().await.context("running migrations")?;
    let store: Arc<dyn Store> = Arc::new(store);

    let orchestrator = build_orchestrator(&config, store)?;

    let schedule = Schedule {
        interval_minutes: config.etl.schedule_minutes,
        run_on_startup: config.etl.run_on_startup,
        parallel: config.etl.parallel,
    };
    let scheduler = tokio::spawn(run_scheduler(orchestrator.clone(), schedule));

    let app = create_router(AppState::new(orchestrator));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.abort();
    info!("ingest engine stopped");
    Ok(())
}

/// Wire enabled sources into an orchestrator.
fn build_orchestrator(config: &Config, store: Arc<dyn Store>) -> anyhow::Result<Orchestrator> {
    let policy = RetryPolicy {
        max_retries: config.etl.max_retries,
        backoff_base: config.etl.backoff_base,
    };
    let mut orchestrator = Orchestrator::new(store, policy);

    if config.sources.coingecko.enabled {
        let cfg = config.sources.coingecko.clone();
        let rate = cfg.rate()?;
        orchestrator.register(
            COINGECKO_SOURCE,
            Arc::new(move |limiters| {
                let limiter = limiters.limiter(COINGECKO_SOURCE, rate);
                Box::new(CoinGeckoPipeline::new(
                    &cfg.base_url,
                    cfg.api_key.clone(),
                    limiter,
                ))
            }),
        );
    }

    if config.sources.coinpaprika.enabled {
        let cfg = config.sources.coinpaprika.clone();
        let rate = cfg.rate()?;
        orchestrator.register(
            COINPAPRIKA_SOURCE,
            Arc::new(move |limiters| {
                let limiter = limiters.limiter(COINPAPRIKA_SOURCE, rate);
                Box::new(CoinPaprikaPipeline::new(&cfg.base_url, limiter))
            }),
        );
    }

    if config.sources.csv.enabled {
        let path = config.sources.csv.path.clone();
        orchestrator.register(
            CSV_SOURCE,
            Arc::new(move |_| Box::new(CsvPipeline::new(path.clone()))),
        );
    }

    info!(sources = ?orchestrator.sources(), "sources registered");
    Ok(orchestrator)
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
