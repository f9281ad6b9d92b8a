//! JSON HTTP surface for the browser dashboard.
//!
//! Holds one in-memory session and exposes uploads, datasets, the active
//! view, its analysis and the next-upload recommendation.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/session` | Telemetry, first-ingestion date, latest error, ingesting flag |
//! | `POST` | `/uploads/{domain}?filename=<name>` | Upload raw file bytes into a domain |
//! | `GET`  | `/datasets/{domain}` | Current dataset for a domain |
//! | `PUT`  | `/view` | Set the active view (`{"view": "market"}`) |
//! | `GET`  | `/analysis` | Analysis state of the active view |
//! | `GET`  | `/recommendation` | Suggested next upload for the active view |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_valid_data", "message": "No valid data found in the uploaded file for customer review" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `busy` (409),
//! `unsupported_format` (415), `no_valid_data` (422), `interrupted` (500),
//! `oracle_failed` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from a different origin.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::{AnalysisSnapshot, ViewAnalyzer};
use crate::config::Config;
use crate::error::IngestError;
use crate::ingest::{IngestOutcome, Ingestor, Upload};
use crate::models::{Dataset, UploadDomain, ViewId};
use crate::normalize::Normalizer;
use crate::oracle::{create_oracle, Oracle};
use crate::recommend::{recommend, Recommendation};
use crate::session::{SessionSnapshot, SessionState, SharedSession};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    session: SharedSession,
    ingestor: Ingestor,
    analyzer: ViewAnalyzer,
}

impl AppState {
    /// Fresh session wired to `oracle`.
    pub fn new(config: &Config, oracle: Arc<dyn Oracle>) -> Self {
        let session = SessionState::shared();
        let normalizer = Normalizer::new(oracle.clone(), config.oracle.sample_limit);
        Self {
            ingestor: Ingestor::new(session.clone(), normalizer),
            analyzer: ViewAnalyzer::new(oracle, session.clone(), config.analysis.clone()),
            session,
        }
    }
}

/// Build the router. Exposed for embedding and tests.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/session", get(handle_session))
        .route("/uploads/{domain}", post(handle_upload))
        .route("/datasets/{domain}", get(handle_dataset))
        .route("/view", put(handle_set_view))
        .route("/analysis", get(handle_analysis))
        .route("/recommendation", get(handle_recommendation))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server with the oracle named in the configuration.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let oracle = create_oracle(&config.oracle)?;
    run_server_with_oracle(config, oracle).await
}

/// Like [`run_server`], but with a caller-supplied oracle.
pub async fn run_server_with_oracle(config: &Config, oracle: Arc<dyn Oracle>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    tracing::info!(oracle = oracle.name(), "starting server");
    let app = router(AppState::new(config, oracle), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on http://{}", bind_addr);
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
    /// Machine-readable error code (e.g., `"bad_request"`, `"busy"`).
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match err.code() {
            "unsupported_format" => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "oracle_failed" => StatusCode::BAD_GATEWAY,
            "no_valid_data" => StatusCode::UNPROCESSABLE_ENTITY,
            "busy" => StatusCode::CONFLICT,
            "interrupted" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.user_message(),
        }
    }
}

fn parse_domain(raw: &str) -> Result<UploadDomain, AppError> {
    raw.parse().map_err(bad_request)
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

// ============ GET /session ============

async fn handle_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.lock().await.snapshot())
}

// ============ POST /uploads/{domain} ============

#[derive(Deserialize)]
struct UploadQuery {
    filename: Option<String>,
}

/// Runs the whole upload before responding. A commit re-derives the
/// analysis in the background.
async fn handle_upload(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<IngestOutcome>, AppError> {
    let domain = parse_domain(&domain)?;
    let file_name = query
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| bad_request("filename query parameter is required"))?;

    let outcome = state
        .ingestor
        .ingest(Upload::new(domain, file_name, body.to_vec()))
        .await?;
    state.analyzer.spawn_refresh().await;
    Ok(Json(outcome))
}

// ============ GET /datasets/{domain} ============

async fn handle_dataset(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<Dataset>, AppError> {
    let domain = parse_domain(&domain)?;
    let session = state.session.lock().await;
    session
        .dataset(domain)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("no {} data uploaded yet", domain)))
}

// ============ PUT /view ============

#[derive(Deserialize)]
struct ViewRequest {
    view: String,
}

async fn handle_set_view(
    State(state): State<AppState>,
    Json(req): Json<ViewRequest>,
) -> Result<Json<AnalysisSnapshot>, AppError> {
    let view: ViewId = req.view.parse().map_err(bad_request)?;
    state.session.lock().await.set_active_view(view);
    state.analyzer.spawn_refresh().await;
    Ok(Json(state.analyzer.snapshot().await))
}

// ============ GET /analysis ============

/// Re-derives first; a no-op unless the view or data changed since the last
/// trigger (e.g. an upload whose client disconnected before its refresh).
async fn handle_analysis(State(state): State<AppState>) -> Json<AnalysisSnapshot> {
    state.analyzer.spawn_refresh().await;
    Json(state.analyzer.snapshot().await)
}

// ============ GET /recommendation ============

#[derive(Serialize)]
struct RecommendationResponse {
    view: ViewId,
    recommendation: Option<Recommendation>,
}

async fn handle_recommendation(State(state): State<AppState>) -> Json<RecommendationResponse> {
    let session = state.session.lock().await;
    let view = session.active_view();
    Json(RecommendationResponse {
        view,
        recommendation: recommend(view, |d| session.has_dataset(d)),
    })
}
