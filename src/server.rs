//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Liveness, with a UTC timestamp |
//! | `GET`    | `/health/detailed` | Component status and index size |
//! | `POST`   | `/chat/query` | Answer with sources and confidence |
//! | `POST`   | `/chat/stream` | Answer as a chunked `text/plain` body |
//! | `POST`   | `/knowledge/upload` | Multipart upload (`file` field) and index |
//! | `GET`    | `/knowledge/documents` | Indexed file names |
//! | `DELETE` | `/knowledge/documents/{filename}` | Remove one document |
//! | `GET`    | `/knowledge/stats` | Pipeline statistics |
//! | `POST`   | `/knowledge/reindex` | Clear and rebuild from the ingest directory |
//! | `DELETE` | `/knowledge/clear` | Remove every indexed chunk |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).
//!
//! # Authentication
//!
//! When `[server] api_key_env` names an environment variable, every
//! `/chat/*` and `/knowledge/*` request must carry that key in `X-API-Key`.
//! Health endpoints stay open.

use anyhow::{bail, Context};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use rag_harness_core::pipeline::PipelineStats;
use rag_harness_core::{QueryRequest, RagError};

use crate::app::AppServices;
use crate::config::{Config, ServerConfig};
use crate::extract::ExtractError;
use crate::ingest::{check_document_name, sanitize_filename};

const API_KEY_HEADER: &str = "x-api-key";
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    services: AppServices,
    /// SHA-256 of the expected API key; `None` disables the check.
    api_key_digest: Option<[u8; 32]>,
}

impl AppState {
    pub fn new(services: AppServices, api_key: Option<&str>) -> Self {
        Self {
            services,
            api_key_digest: api_key.map(|key| Sha256::digest(key.as_bytes()).into()),
        }
    }
}

/// Build the services from `config` and serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let api_key = resolve_api_key(&config.server)?;
    let services = AppServices::build(config).await?;
    let app = router(AppState::new(services, api_key.as_deref()));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(
        address = %config.server.bind,
        auth = api_key.is_some(),
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// The full route table with CORS, tracing and API-key middleware applied.
pub fn router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.services.config.server.allowed_origins);

    let protected = Router::new()
        .route("/chat/query", post(handle_query))
        .route("/chat/stream", post(handle_stream))
        .route(
            "/knowledge/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/knowledge/documents", get(handle_list_documents))
        .route(
            "/knowledge/documents/{filename}",
            delete(handle_delete_document),
        )
        .route("/knowledge/stats", get(handle_stats))
        .route("/knowledge/reindex", post(handle_reindex))
        .route("/knowledge/clear", delete(handle_clear))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route("/health/detailed", get(handle_detailed_health))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn resolve_api_key(config: &ServerConfig) -> anyhow::Result<Option<String>> {
    let Some(var) = &config.api_key_env else {
        return Ok(None);
    };
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
        _ => bail!(
            "server.api_key_env is set to {} but that environment variable is empty or unset",
            var
        ),
    }
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.api_key_digest {
        let supplied = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        let digest: [u8; 32] = Sha256::digest(supplied.as_bytes()).into();
        if supplied.is_empty() || digest != *expected {
            return Err(unauthorized("missing or invalid X-API-Key header"));
        }
    }
    Ok(next.run(request).await)
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

/// Handler error that renders as the JSON error body.
#[derive(Debug)]
pub struct AppError {
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

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        if err.is_client_error() {
            bad_request(err.to_string())
        } else {
            error!(error = %err, "query failed");
            internal(err.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{:#}", err), "request failed");
        internal(format!("{:#}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

/// Extraction problems are the uploader's fault; anything else is ours.
fn ingest_error(err: anyhow::Error) -> AppError {
    if err.chain().any(|cause| cause.is::<ExtractError>()) {
        bad_request(format!("{:#}", err))
    } else {
        AppError::from(err)
    }
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
    vector_db_status: String,
    llm_status: String,
    search_status: String,
    documents_indexed: usize,
    embedding_model: String,
    llm_model: String,
}

/// `healthy` needs a readable store and a configured LLM. Web search is
/// optional and never degrades the overall status.
async fn handle_detailed_health(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let config = &state.services.config;
    let pipeline = &state.services.pipeline;

    let (vector_db_status, documents_indexed) = match pipeline.store().stats().await {
        Ok(stats) => ("ok".to_string(), stats.total_chunks),
        Err(e) => {
            error!(error = %format!("{:#}", e), "vector store health check failed");
            (format!("error: {}", e), 0)
        }
    };
    let llm_status = status_for_provider(&config.llm.provider);
    let search_status = status_for_provider(&config.search.provider);

    let status = if vector_db_status == "ok" && llm_status == "ok" {
        "healthy"
    } else {
        "degraded"
    };

    Json(DetailedHealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        vector_db_status,
        llm_status,
        search_status,
        documents_indexed,
        embedding_model: pipeline.embedder().model_name().to_string(),
        llm_model: pipeline.generator().model_name().to_string(),
    })
}

fn status_for_provider(provider: &str) -> String {
    if provider == "disabled" {
        "disabled".to_string()
    } else {
        "ok".to_string()
    }
}

// ============ Chat ============

/// Body of `/chat/query` and `/chat/stream`.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default = "default_use_search")]
    use_search: bool,
    #[serde(default)]
    num_results: Option<usize>,
    #[serde(default)]
    search_threshold: Option<f64>,
}

fn default_use_search() -> bool {
    true
}

impl From<ChatRequest> for QueryRequest {
    fn from(body: ChatRequest) -> Self {
        QueryRequest {
            query: body.query,
            use_search: body.use_search,
            num_results: body.num_results,
            search_threshold: body.search_threshold,
        }
    }
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let request = QueryRequest::from(body);
    let response = state.services.pipeline.query(&request).await?;
    Ok(Json(response).into_response())
}

/// Fragments are forwarded as the model produces them. If the client goes
/// away the body stream is dropped, which drops the upstream response and
/// stops generation. A mid-stream failure aborts the body so a truncated
/// answer is never mistaken for a complete one.
async fn handle_stream(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = body?;
    let request = QueryRequest::from(body);
    let fragments = state.services.pipeline.query_stream(&request).await?;

    let fragments = fragments.map(|item| {
        item.inspect_err(|e| error!(error = %format!("{:#}", e), "streamed generation failed"))
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(fragments),
    )
        .into_response())
}

// ============ Knowledge ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    chunks_created: usize,
    total_documents: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("the file field has no file name"))?;
        let filename = sanitize_filename(&filename).map_err(|e| bad_request(e.to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let report = state
            .services
            .ingestor
            .ingest_upload(&filename, &bytes)
            .await
            .map_err(ingest_error)?;

        return Ok(Json(UploadResponse {
            message: format!("Successfully uploaded and indexed {}", report.filename),
            filename: report.filename,
            chunks_created: report.chunks_created,
            total_documents: report.total_chunks,
        }));
    }

    Err(bad_request("multipart field 'file' is required"))
}

#[derive(Serialize)]
struct DocumentListResponse {
    documents: Vec<String>,
    total_count: usize,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let documents = state.services.pipeline.store().list_files().await?;
    Ok(Json(DocumentListResponse {
        total_count: documents.len(),
        documents,
    }))
}

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
    chunks_removed: usize,
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    check_document_name(&filename).map_err(|e| bad_request(e.to_string()))?;
    let report = state.services.ingestor.delete_document(&filename).await?;
    if !report.found() {
        return Err(not_found(format!("document not found: {}", filename)));
    }
    Ok(Json(DeleteResponse {
        message: format!("Successfully deleted {}", filename),
        chunks_removed: report.chunks_removed,
    }))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<PipelineStats>, AppError> {
    Ok(Json(state.services.pipeline.stats().await?))
}

#[derive(Serialize)]
struct ReindexResponse {
    message: String,
    files_indexed: usize,
    total_chunks: usize,
    unique_files: usize,
    failed: Vec<String>,
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Json<ReindexResponse>, AppError> {
    let report = state.services.ingestor.reindex().await?;
    let stats = state.services.pipeline.store().stats().await?;
    Ok(Json(ReindexResponse {
        message: "Reindexing completed successfully".to_string(),
        files_indexed: report.files.len(),
        total_chunks: stats.total_chunks,
        unique_files: stats.unique_files,
        failed: report.failed.into_iter().map(|(name, _)| name).collect(),
    }))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_clear(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state.services.pipeline.store().clear().await?;
    info!("knowledge base cleared");
    Ok(Json(MessageResponse {
        message: "Knowledge base cleared".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rag_error_mapping() {
        let err = AppError::from(RagError::InvalidRequest("query must not be empty".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");

        let err = AppError::from(RagError::Generation(anyhow::anyhow!("upstream 503")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
        assert!(err.message.contains("upstream 503"));
    }

    #[test]
    fn test_extraction_failures_are_client_errors() {
        let err = anyhow::Error::new(ExtractError::Pdf("no xref".into())).context("failed to extract x.pdf");
        assert_eq!(ingest_error(err).status, StatusCode::BAD_REQUEST);

        let err = anyhow::anyhow!("database is locked");
        assert_eq!(ingest_error(err).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_resolve_api_key() {
        assert_eq!(resolve_api_key(&ServerConfig::default()).unwrap(), None);

        let config = ServerConfig {
            api_key_env: Some("RAG_HARNESS_TEST_UNSET_KEY_VAR".to_string()),
            ..Default::default()
        };
        assert!(resolve_api_key(&config).is_err());
    }
}
