//! JSON HTTP API.
//!
//! A thin layer over [`AskDb`]: every handler validates its input, calls
//! one service operation and serializes the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/connect` | Connect to a data source and discover its schema |
//! | `GET`  | `/api/schema` | The discovered schema and document count |
//! | `POST` | `/api/query` | Answer a question, one page at a time |
//! | `GET`  | `/api/query/history` | Recent queries, oldest first |
//! | `GET`  | `/api/metrics` | Engine counters |
//! | `POST` | `/api/ingest` | Start an ingestion job for a list of server-side file paths |
//! | `GET`  | `/api/ingest/{job_id}` | Ingestion job status |
//! | `GET`  | `/api/export?q=&format=` | Full structured result as CSV or JSON |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/api/ingest` reads paths on the server's filesystem with the server
//! process's permissions, and their text becomes searchable through
//! `/api/query`. Bind to a loopback address (the default) unless every
//! client is trusted with that access.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_query", "message": "unsupported query 'list widgets': no table matches 'widgets'" } }
//! ```
//!
//! `bad_request` and `unsupported_query` map to 400, `not_found` to 404,
//! `connection_error` to 502, everything else to 500.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use askdb_core::engine::{EngineMetrics, ResultPage};
use askdb_core::export::ExportFormat;
use askdb_core::metrics::HistoryEntry;
use askdb_core::models::SchemaSummary;
use askdb_core::Error;

use crate::ingest::{IngestionJob, JobStatus};
use crate::service::{AskDb, SchemaView};

type AppState = Arc<AskDb>;

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(service: AskDb) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "askdb server listening");
    serve(Arc::new(service), listener).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(service: Arc<AskDb>, listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router(service)).await?;
    Ok(())
}

pub fn router(service: Arc<AskDb>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/connect", post(handle_connect))
        .route("/api/schema", get(handle_schema))
        .route("/api/query", post(handle_query))
        .route("/api/query/history", get(handle_history))
        .route("/api/metrics", get(handle_metrics))
        .route("/api/ingest", post(handle_ingest))
        .route("/api/ingest/{job_id}", get(handle_ingest_status))
        .route("/api/export", get(handle_export))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let code = err.code();
        let status = match code {
            "bad_request" | "unsupported_query" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "connection_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/connect ============

#[derive(Deserialize)]
struct ConnectRequest {
    connection_string: String,
}

async fn handle_connect(
    State(service): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<SchemaSummary>, AppError> {
    Ok(Json(service.connect(&req.connection_string).await?))
}

// ============ GET /api/schema ============

async fn handle_schema(State(service): State<AppState>) -> Json<SchemaView> {
    Json(service.schema())
}

// ============ POST /api/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    page: Option<usize>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default = "default_use_cache")]
    use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

async fn handle_query(
    State(service): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ResultPage>, AppError> {
    let page = service
        .query(&req.query, req.page, req.page_size, req.use_cache)
        .await?;
    Ok(Json(page))
}

// ============ GET /api/query/history ============

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<HistoryEntry>,
}

async fn handle_history(
    State(service): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        history: service.history(params.limit),
    })
}

// ============ GET /api/metrics ============

async fn handle_metrics(State(service): State<AppState>) -> Json<EngineMetrics> {
    Json(service.metrics())
}

// ============ POST /api/ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    paths: Vec<PathBuf>,
}

#[derive(Serialize)]
struct IngestResponse {
    job_id: String,
    status: JobStatus,
}

async fn handle_ingest(
    State(service): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let job_id = service.ingest(req.paths)?;
    let status = service.ingestion_status(&job_id)?.status;
    Ok((StatusCode::ACCEPTED, Json(IngestResponse { job_id, status })))
}

// ============ GET /api/ingest/{job_id} ============

async fn handle_ingest_status(
    State(service): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<IngestionJob>, AppError> {
    Ok(Json(service.ingestion_status(&job_id)?))
}

// ============ GET /api/export ============

#[derive(Deserialize)]
struct ExportParams {
    q: String,
    #[serde(default = "default_format")]
    format: String,
}

fn default_format() -> String {
    "csv".to_string()
}

async fn handle_export(
    State(service): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let format = ExportFormat::parse(&params.format)?;
    let bytes = service.export(&params.q, format).await?;
    let disposition = format!("attachment; filename=\"askdb-export.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
