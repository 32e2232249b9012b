//! HTTP server.
//!
//! Exposes the retrieval pipeline as a JSON API for the quiz generator's
//! front end.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/retrieve` | Run one retrieval over `{notes, topic?}` |
//! | `GET`  | `/health` | Health check (version and embedder) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "injection_detected", "message": "invalid input detected ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `input_too_long` (400),
//! `injection_detected` (400), `degenerate_input` (422), `internal` (500).
//!
//! Embedding failures are not errors: the response is a `200` whose
//! `pathway` is `"FALLBACK"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! served from another origin can call the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use notes_rag_core::models::RetrievalResult;
use notes_rag_core::pipeline::{RetrievalError, RetrievalPipeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::telemetry::{TelemetryLog, TelemetryRecord};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RetrievalPipeline>,
    /// `None` when `[telemetry].enabled = false`.
    telemetry: Option<TelemetryLog>,
}

impl AppState {
    pub fn new(pipeline: Arc<RetrievalPipeline>, telemetry: Option<TelemetryLog>) -> Self {
        Self {
            pipeline,
            telemetry,
        }
    }

    /// Build the embedder and pipeline described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let pipeline = RetrievalPipeline::new(config.retrieval_config(), embedder);
        let telemetry = config
            .telemetry
            .enabled
            .then(|| TelemetryLog::new(&config.telemetry.path));
        Ok(Self::new(Arc::new(pipeline), telemetry))
    }

    async fn record(&self, record: TelemetryRecord) {
        if let Some(log) = &self.telemetry {
            if let Err(e) = log.append_blocking(record).await {
                tracing::warn!(error = %e, "failed to write telemetry record");
            }
        }
    }
}

/// Build the router with CORS applied. Exposed so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/retrieve", post(handle_retrieve))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    tracing::info!(
        embedder = state.pipeline.embedder().model_name(),
        dims = state.pipeline.embedder().dims(),
        "retrieval pipeline ready"
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"input_too_long"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let status = match &err {
            RetrievalError::InputTooLong { .. } | RetrievalError::InjectionDetected { .. } => {
                StatusCode::BAD_REQUEST
            }
            RetrievalError::DegenerateInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RetrievalError::EmbeddingUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /retrieve ============

#[derive(Debug, Deserialize)]
struct RetrieveRequest {
    notes: String,
    /// Empty or missing means the configured default query.
    #[serde(default)]
    topic: Option<String>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Result<Json<RetrievalResult>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    let topic = req.topic.as_deref().unwrap_or("");
    let started = Instant::now();

    match state.pipeline.retrieve(&req.notes, topic).await {
        Ok(result) => {
            tracing::info!(
                pathway = %result.pathway,
                used = result.used_chunks.len(),
                context_chars = result.stats.context_chars,
                latency_ms = result.stats.latency.as_millis() as u64,
                "retrieve"
            );
            state.record(TelemetryRecord::from_result(&result)).await;
            Ok(Json(result))
        }
        Err(err) => {
            tracing::info!(code = err.code(), stage = %err.stage(), "retrieve rejected");
            state.record(TelemetryRecord::from_error(&err, started.elapsed())).await;
            Err(err.into())
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
    embedder: String,
    dims: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let embedder = state.pipeline.embedder();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedder: embedder.model_name().to_string(),
        dims: embedder.dims(),
    })
}
