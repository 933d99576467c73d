//! SQLite store adapter (sqlx).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, Transaction};
use tracing::info;

use crate::models::{
    Checkpoint, CheckpointStatus, Coin, CoinFilter, NewCoin, RawRecord, RunRecord, RunStatus,
    SourceStats,
};

use super::{Store, StoreError, StoreTx};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS coins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    coin_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    current_price REAL,
    market_cap REAL,
    volume_24h REAL,
    price_change_24h REAL,
    rank INTEGER,
    source TEXT NOT NULL,
    last_updated TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (coin_id, source)
);
CREATE INDEX IF NOT EXISTS idx_coins_symbol ON coins (symbol);
CREATE INDEX IF NOT EXISTS idx_coins_source ON coins (source);
CREATE INDEX IF NOT EXISTS idx_coins_rank ON coins (rank);

CREATE TABLE IF NOT EXISTS raw_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    coin_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_raw_source_coin ON raw_records (source, coin_id);
CREATE INDEX IF NOT EXISTS idx_raw_ingested_at ON raw_records (ingested_at);

CREATE TABLE IF NOT EXISTS etl_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL UNIQUE,
    last_run_at TEXT,
    last_success_at TEXT,
    last_failure_at TEXT,
    status TEXT NOT NULL,
    records_processed INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS etl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    records_processed INTEGER NOT NULL DEFAULT 0,
    duration_seconds REAL NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_runs_source ON etl_runs (source);
CREATE INDEX IF NOT EXISTS idx_runs_started_at ON etl_runs (started_at);
";

/// SQLite implementation of [`Store`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://coinflow.db`), creating the database
    /// file and schema when missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_pool_size(url, 5).await
    }

    /// Connect to a fresh in-memory database (development and tests).
    ///
    /// Pinned to a single connection: every connection to `:memory:` is an
    /// independent database.
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        Self::connect_with_pool_size("sqlite::memory:", 1).await
    }

    async fn connect_with_pool_size(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "sqlite store initialized");
        Ok(store)
    }

    /// Apply the schema. Idempotent; also run by `connect`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

// SQLite caps one statement at 32766 bound parameters; batches larger than
// that are split into multiple statements inside the same transaction.
const BIND_LIMIT: usize = 32_766;
const RAW_BINDS_PER_ROW: usize = 4;
const COIN_BINDS_PER_ROW: usize = 12;

struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
}

fn query_err(err: sqlx::Error) -> StoreError {
    StoreError::Query(err.to_string())
}

fn checkpoint_from_row(row: &SqliteRow) -> Result<Checkpoint, StoreError> {
    let status: String = row.try_get("status").map_err(query_err)?;
    Ok(Checkpoint {
        source: row.try_get("source").map_err(query_err)?,
        last_run_at: row.try_get("last_run_at").map_err(query_err)?,
        last_success_at: row.try_get("last_success_at").map_err(query_err)?,
        last_failure_at: row.try_get("last_failure_at").map_err(query_err)?,
        status: CheckpointStatus::parse(&status)
            .ok_or_else(|| StoreError::Query(format!("unknown checkpoint status: {status}")))?,
        records_processed: row.try_get("records_processed").map_err(query_err)?,
        error_message: row.try_get("error_message").map_err(query_err)?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord, StoreError> {
    let status: String = row.try_get("status").map_err(query_err)?;
    Ok(RunRecord {
        run_id: row.try_get("run_id").map_err(query_err)?,
        source: row.try_get("source").map_err(query_err)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| StoreError::Query(format!("unknown run status: {status}")))?,
        records_processed: row.try_get("records_processed").map_err(query_err)?,
        duration_seconds: row.try_get("duration_seconds").map_err(query_err)?,
        started_at: row.try_get("started_at").map_err(query_err)?,
        completed_at: row.try_get("completed_at").map_err(query_err)?,
        error_message: row.try_get("error_message").map_err(query_err)?,
    })
}

fn coin_from_row(row: &SqliteRow) -> Result<Coin, StoreError> {
    Ok(Coin {
        id: row.try_get("id").map_err(query_err)?,
        coin_id: row.try_get("coin_id").map_err(query_err)?,
        symbol: row.try_get("symbol").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        current_price: row.try_get("current_price").map_err(query_err)?,
        market_cap: row.try_get("market_cap").map_err(query_err)?,
        volume_24h: row.try_get("volume_24h").map_err(query_err)?,
        price_change_24h: row.try_get("price_change_24h").map_err(query_err)?,
        rank: row.try_get("rank").map_err(query_err)?,
        source: row.try_get("source").map_err(query_err)?,
        last_updated: row
            .try_get::<Option<DateTime<Utc>>, _>("last_updated")
            .map_err(query_err)?
            .unwrap_or_else(Utc::now),
        created_at: row.try_get("created_at").map_err(query_err)?,
        updated_at: row.try_get("updated_at").map_err(query_err)?,
    })
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn insert_raw(&mut self, records: &[RawRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let payloads: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(&r.payload))
            .collect::<Result<_, _>>()?;

        let rows_per_chunk = BIND_LIMIT / RAW_BINDS_PER_ROW;
        for (records, payloads) in records
            .chunks(rows_per_chunk)
            .zip(payloads.chunks(rows_per_chunk))
        {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO raw_records (source, coin_id, payload, ingested_at) ",
            );
            qb.push_values(records.iter().zip(payloads), |mut b, (record, payload)| {
                b.push_bind(&record.source)
                    .push_bind(&record.coin_id)
                    .push_bind(payload)
                    .push_bind(record.ingested_at);
            });
            qb.build()
                .execute(&mut *self.tx)
                .await
                .map_err(query_err)?;
        }
        Ok(())
    }

    async fn upsert_coins(&mut self, coins: &[NewCoin]) -> Result<usize, StoreError> {
        if coins.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();

        for chunk in coins.chunks(BIND_LIMIT / COIN_BINDS_PER_ROW) {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "INSERT INTO coins (coin_id, symbol, name, current_price, market_cap, \
                 volume_24h, price_change_24h, rank, source, last_updated, created_at, \
                 updated_at) ",
            );
            qb.push_values(chunk, |mut b, coin| {
                b.push_bind(&coin.coin_id)
                    .push_bind(&coin.symbol)
                    .push_bind(&coin.name)
                    .push_bind(coin.current_price)
                    .push_bind(coin.market_cap)
                    .push_bind(coin.volume_24h)
                    .push_bind(coin.price_change_24h)
                    .push_bind(coin.rank)
                    .push_bind(&coin.source)
                    .push_bind(coin.last_updated)
                    .push_bind(now)
                    .push_bind(now);
            });
            qb.push(
                " ON CONFLICT (coin_id, source) DO UPDATE SET \
                 symbol = excluded.symbol, \
                 name = excluded.name, \
                 current_price = excluded.current_price, \
                 market_cap = excluded.market_cap, \
                 volume_24h = excluded.volume_24h, \
                 price_change_24h = excluded.price_change_24h, \
                 rank = excluded.rank, \
                 last_updated = excluded.last_updated, \
                 updated_at = excluded.updated_at",
            );
            qb.build()
                .execute(&mut *self.tx)
                .await
                .map_err(query_err)?;
        }
        Ok(coins.len())
    }

    async fn upsert_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO etl_checkpoints (source, last_run_at, last_success_at, last_failure_at, \
             status, records_processed, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (source) DO UPDATE SET \
             last_run_at = excluded.last_run_at, \
             last_success_at = excluded.last_success_at, \
             last_failure_at = excluded.last_failure_at, \
             status = excluded.status, \
             records_processed = excluded.records_processed, \
             error_message = excluded.error_message",
        )
        .bind(&checkpoint.source)
        .bind(checkpoint.last_run_at)
        .bind(checkpoint.last_success_at)
        .bind(checkpoint.last_failure_at)
        .bind(checkpoint.status.as_str())
        .bind(checkpoint.records_processed)
        .bind(&checkpoint.error_message)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn insert_run(&mut self, run: &RunRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO etl_runs (run_id, source, status, records_processed, duration_seconds, \
             started_at, completed_at, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(&run.source)
        .bind(run.status.as_str())
        .bind(run.records_processed)
        .bind(run.duration_seconds)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error_message)
        .execute(&mut *self.tx)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(query_err)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(query_err)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn get_checkpoint(&self, source: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query("SELECT * FROM etl_checkpoints WHERE source = ?")
            .bind(source)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;
        row.as_ref().map(checkpoint_from_row).transpose()
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let rows = sqlx::query("SELECT * FROM etl_checkpoints ORDER BY source")
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    async fn list_runs(
        &self,
        source: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RunRecord>, StoreError> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM etl_runs");
        if let Some(source) = source {
            qb.push(" WHERE source = ").push_bind(source);
        }
        qb.push(" ORDER BY started_at DESC LIMIT ")
            .push_bind(i64::from(limit));
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
        rows.iter().map(run_from_row).collect()
    }

    async fn query_coins(&self, filter: &CoinFilter) -> Result<(Vec<Coin>, u64), StoreError> {
        let mut count_qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM coins WHERE 1 = 1");
        let mut page_qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM coins WHERE 1 = 1");
        for qb in [&mut count_qb, &mut page_qb] {
            if let Some(source) = &filter.source {
                qb.push(" AND source = ").push_bind(source);
            }
            if let Some(symbol) = &filter.symbol {
                qb.push(" AND symbol = ").push_bind(symbol);
            }
        }
        page_qb
            .push(" ORDER BY rank DESC LIMIT ")
            .push_bind(i64::from(filter.page_size))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset()));

        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)?
            .try_get(0)
            .map_err(query_err)?;
        let rows = page_qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;
        let coins = rows.iter().map(coin_from_row).collect::<Result<_, _>>()?;
        Ok((coins, total as u64))
    }

    async fn run_stats(&self) -> Result<Vec<SourceStats>, StoreError> {
        let rows = sqlx::query(
            "SELECT source, \
             COUNT(*) AS total_runs, \
             COALESCE(SUM(records_processed), 0) AS records_processed, \
             COALESCE(AVG(CASE WHEN status = 'success' THEN duration_seconds END), 0.0) AS avg_duration, \
             SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END) AS successes, \
             MAX(CASE WHEN status = 'success' THEN completed_at END) AS last_success, \
             MAX(CASE WHEN status = 'failure' THEN completed_at END) AS last_failure \
             FROM etl_runs GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                let total_runs: i64 = row.try_get("total_runs").map_err(query_err)?;
                let successes: i64 = row.try_get("successes").map_err(query_err)?;
                let success_rate = if total_runs > 0 {
                    successes as f64 / total_runs as f64 * 100.0
                } else {
                    0.0
                };
                Ok(SourceStats {
                    source: row.try_get("source").map_err(query_err)?,
                    total_runs,
                    records_processed: row.try_get("records_processed").map_err(query_err)?,
                    average_duration_seconds: row.try_get("avg_duration").map_err(query_err)?,
                    success_rate,
                    last_success: row.try_get("last_success").map_err(query_err)?,
                    last_failure: row.try_get("last_failure").map_err(query_err)?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}
