//! HTTP surface.
//!
//! Thin JSON API over the core operations. Handlers validate the request,
//! call into the core, and map the error taxonomy onto structured
//! `{ "error": ..., "message": ... }` responses; no business logic lives
//! here.
//!
//! | Method   | Path                    | Description                       |
//! |----------|-------------------------|-----------------------------------|
//! | `GET`    | `/health`               | Liveness check                    |
//! | `GET`    | `/kb`                   | List knowledge bases              |
//! | `POST`   | `/kb/{name}`            | Create (idempotent)               |
//! | `DELETE` | `/kb/{name}`            | Delete both directory trees       |
//! | `POST`   | `/kb/{name}/documents`  | Ingest an upload set              |
//! | `POST`   | `/kb/{name}/repository` | Clone and ingest a repository     |
//! | `POST`   | `/kb/{name}/query`      | Ask a question                    |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::Error;
use crate::ingest::{self, KbLocks, UploadFile};
use crate::kb::KnowledgeBaseStore;
use crate::rag;
use crate::repo::CloneRequest;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    locks: Arc<KbLocks>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState {
        config: Arc::new(config.clone()),
        locks: Arc::new(KbLocks::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/kb", get(list_kb))
        .route("/kb/{name}", post(create_kb).delete(delete_kb))
        .route("/kb/{name}/documents", post(ingest_documents))
        .route("/kb/{name}/repository", post(ingest_repository))
        .route("/kb/{name}/query", post(query_kb))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "ragbase listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error mapping ============

enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unavailable(msg) => (StatusCode::BAD_GATEWAY, "repository_unavailable", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::RepositoryUnavailable(_) => ApiError::Unavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

/// Knowledge base names become directory names, so only path-safe names
/// are accepted at the boundary.
fn validate_name(name: &str) -> Result<(), ApiError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "invalid knowledge base name: '{}'",
            name
        )))
    }
}

// ============ Request/response bodies ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadFileBody>,
}

#[derive(Deserialize)]
struct UploadFileBody {
    name: String,
    content: String,
}

#[derive(Deserialize)]
struct RepositoryRequest {
    url: String,
    branch: Option<String>,
    username: Option<String>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ListResponse {
    knowledge_bases: Vec<String>,
}

#[derive(Serialize)]
struct IngestResponse {
    chunks: usize,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

// ============ Handlers ============

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_kb(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let store = KnowledgeBaseStore::new(&state.config);
    let knowledge_bases = store.list()?;
    Ok(Json(ListResponse { knowledge_bases }))
}

async fn create_kb(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    validate_name(&name)?;
    let store = KnowledgeBaseStore::new(&state.config);
    store.ensure(&name)?;
    Ok(Json(StatusResponse { status: "created" }))
}

async fn delete_kb(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    validate_name(&name)?;
    let store = KnowledgeBaseStore::new(&state.config);
    if store.delete(&name) {
        Ok(Json(StatusResponse { status: "deleted" }))
    } else {
        Err(ApiError::Internal(format!(
            "knowledge base '{}' could not be fully deleted; check permissions and open files",
            name
        )))
    }
}

async fn ingest_documents(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<UploadRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    validate_name(&name)?;
    let files: Vec<UploadFile> = body
        .files
        .into_iter()
        .map(|f| UploadFile {
            name: f.name,
            content: f.content.into_bytes(),
        })
        .collect();

    let chunks = ingest::ingest_files(&state.config, &state.locks, &name, &files).await?;
    Ok(Json(IngestResponse { chunks }))
}

async fn ingest_repository(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RepositoryRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    validate_name(&name)?;
    if body.url.trim().is_empty() {
        return Err(ApiError::BadRequest("repository url must not be empty".to_string()));
    }

    let req = CloneRequest {
        url: body.url,
        branch: body.branch,
        username: body.username,
        token: body.token,
    };
    let chunks = ingest::ingest_repository(&state.config, &state.locks, &name, &req).await?;
    Ok(Json(IngestResponse { chunks }))
}

async fn query_kb(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<rag::Answer>, ApiError> {
    validate_name(&name)?;
    if body.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }
    let top_k = body.top_k.unwrap_or(state.config.retrieval.top_k);
    if top_k == 0 {
        return Err(ApiError::BadRequest("top_k must be >= 1".to_string()));
    }

    let store = KnowledgeBaseStore::new(&state.config);
    let answer = rag::answer(&state.config, &store.vector_dir(&name), &body.question, top_k).await?;
    Ok(Json(answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("alpha").is_ok());
        assert!(validate_name("my-kb_01.v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("with space").is_err());
    }
}
