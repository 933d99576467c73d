//! HTTP/JSON API server implementation.
//!
//! A thin shell over the orchestrator and the read-side service. The
//! orchestrator stays the only mutation path; handlers translate store
//! failures into JSON error bodies and never panic.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{CheckpointStatus, CheckpointView, CoinPage, RunRecord, SourceStats};
use crate::orchestrator::Orchestrator;
use crate::service::DataService;
use crate::store::StoreError;

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    data: DataService,
}

impl AppState {
    /// Create the shared state.
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        let data = DataService::new(orchestrator.store());
        Self { orchestrator, data }
    }
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/data", get(get_data))
        .route("/etl/status", get(etl_status))
        .route("/etl/trigger", post(etl_trigger))
        .route("/etl/stats", get(etl_stats))
        .route("/etl/runs", get(etl_runs))
        .with_state(state)
}

/// Health report body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: `healthy`, `degraded` or `unhealthy`.
    pub status: &'static str,
    /// Database connectivity: `connected` or `error`.
    pub database: &'static str,
    /// Per-source checkpoint projection.
    pub etl: HashMap<String, CheckpointView>,
}

/// Health check: database connectivity plus the ETL checkpoint projection.
///
/// `unhealthy` when the database is unreachable, `degraded` when any source's
/// latest run failed, `healthy` otherwise.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = state.orchestrator.store().ping().await.is_ok();
    let etl = state.orchestrator.get_status().await;

    let any_failed = etl
        .values()
        .any(|cp| cp.status == CheckpointStatus::Failure);
    let status = if !database_ok {
        "unhealthy"
    } else if any_failed {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        database: if database_ok { "connected" } else { "error" },
        etl,
    })
}

/// Query parameters for `GET /data`.
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    /// Filter by source (case-insensitive).
    pub source: Option<String>,
    /// Filter by symbol (case-insensitive).
    pub symbol: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Rows per page.
    pub page_size: Option<u32>,
}

/// Paginated coin listing.
async fn get_data(
    State(state): State<AppState>,
    Query(query): Query<DataQuery>,
) -> Result<Json<CoinPage>, ApiError> {
    let page = state
        .data
        .list_coins(
            query.source.as_deref(),
            query.symbol.as_deref(),
            query.page,
            query.page_size,
        )
        .await?;
    Ok(Json(page))
}

/// Checkpoint projection for every source.
async fn etl_status(State(state): State<AppState>) -> Json<HashMap<String, CheckpointView>> {
    Json(state.orchestrator.get_status().await)
}

/// Query parameters for `POST /etl/trigger`.
#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    /// Run one source; all registered sources when omitted.
    pub source: Option<String>,
}

/// Per-source outcomes of a triggered run.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    /// `true` for each source whose run committed.
    pub results: HashMap<String, bool>,
}

/// Trigger a run for one source or all of them, synchronously.
async fn etl_trigger(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<TriggerResponse>, ApiError> {
    match query.source {
        Some(source) => {
            let source = source.to_lowercase();
            if !state.orchestrator.has_source(&source) {
                return Err(ApiError::not_found(format!("unknown source '{source}'")));
            }
            info!(source, "run triggered via API");
            let ok = state.orchestrator.run_single(&source).await;
            Ok(Json(TriggerResponse {
                results: HashMap::from([(source, ok)]),
            }))
        }
        None => {
            info!("full run triggered via API");
            let results = state.orchestrator.run_all(true).await;
            Ok(Json(TriggerResponse { results }))
        }
    }
}

/// Per-source run statistics.
async fn etl_stats(State(state): State<AppState>) -> Result<Json<Vec<SourceStats>>, ApiError> {
    Ok(Json(state.data.run_stats().await?))
}

/// Query parameters for `GET /etl/runs`.
#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    /// Filter by source.
    pub source: Option<String>,
    /// Maximum rows to return.
    pub limit: Option<u32>,
}

/// Run history, newest first.
async fn etl_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<Vec<RunRecord>>, ApiError> {
    let runs = state
        .data
        .list_runs(query.source.as_deref(), query.limit)
        .await?;
    Ok(Json(runs))
}

/// API error carrying an HTTP status and a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// 404 with a message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Query(_) | StoreError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
