//! HTTP surface for repo-chat.
//!
//! Every route lives under `/api`:
//!
//! - `POST /api/add_repo` – Normalize `repo_url`, ingest the repository, and register it.
//!   Returns `{ "message", "repo" }`; repeated adds are acknowledged without re-ingesting.
//! - `GET /api/get_repos` – Registered repositories in insertion order.
//! - `POST /api/chat` – Answer `query` using only content ingested for `repo_url`.
//! - `GET /api/health` – Liveness check.
//!
//! Request bodies are read leniently: a missing, oversized, or malformed body and a non-object
//! payload are all treated as `{}` so the handler can report the specific missing field. Errors,
//! including unknown routes and unsupported methods, are always rendered as
//! `{ "error": "<message>" }`.

use crate::rag::{IngestRequest, RagApi, ScopeFilter};
use crate::registry::RepoRegistry;
use crate::repo_id::{InvalidRepoId, RepoId};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MSG_ALREADY_ADDED: &str = "Repository already added";
const MSG_ADDED: &str = "Repository added successfully!";

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Durable list of registered repositories.
    pub registry: Arc<dyn RepoRegistry>,
    /// Ingestion and question-answering backend.
    pub rag: Arc<dyn RagApi>,
    ingest_locks: IngestLocks,
}

impl AppState {
    /// Bundle the registry and retrieval backend for the router.
    pub fn new(registry: Arc<dyn RepoRegistry>, rag: Arc<dyn RagApi>) -> Self {
        Self {
            registry,
            rag,
            ingest_locks: IngestLocks::default(),
        }
    }
}

/// One lock per repository, held from the registry check until the repository is registered.
#[derive(Clone, Default)]
struct IngestLocks(Arc<Mutex<HashMap<RepoId, Arc<Mutex<()>>>>>);

impl IngestLocks {
    async fn acquire(&self, repo: &RepoId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.0.lock().await;
            locks.entry(repo.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Build the HTTP router with CORS enabled for the `/api` namespace.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    let api = Router::new()
        .route("/add_repo", post(add_repo).fallback(method_not_allowed))
        .route("/get_repos", get(get_repos).fallback(method_not_allowed))
        .route("/chat", post(chat).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(cors)
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
}

/// Errors returned to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required string field was absent, blank, or not a string.
    #[error("Missing '{0}' in request body.")]
    MissingField(&'static str),
    /// Repository identifier could not be normalized.
    #[error(transparent)]
    InvalidRepo(#[from] InvalidRepoId),
    /// No route matches the request path.
    #[error("Not found")]
    NotFound,
    /// The route exists but does not accept the request method.
    #[error("Method not allowed")]
    MethodNotAllowed,
    /// A collaborator failed while serving the request.
    #[error("Failed to {action}. Reason: {reason}")]
    Internal {
        /// What the handler was doing, e.g. `add repository`.
        action: &'static str,
        /// Display form of the underlying failure.
        reason: String,
    },
}

impl ApiError {
    fn internal(action: &'static str, error: &(dyn StdError + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        tracing::error!(action, error = %error, causes = ?chain, "Request failed");
        Self::Internal {
            action,
            reason: error.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingField(_) | Self::InvalidRepo(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct AddRepoResponse {
    message: &'static str,
    repo: RepoId,
}

#[derive(Serialize)]
struct ReposResponse {
    repos: Vec<RepoId>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
}

/// Register and ingest a repository.
async fn add_repo(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AddRepoResponse>, ApiError> {
    let fields = parse_fields(body);
    let raw = required_field(&fields, "repo_url")?;
    let repo = RepoId::parse(raw)?;

    let _ingesting = state.ingest_locks.acquire(&repo).await;
    if state.registry.contains(&repo).await {
        tracing::info!(repo = %repo, "Repository already registered");
        return Ok(Json(AddRepoResponse {
            message: MSG_ALREADY_ADDED,
            repo,
        }));
    }

    const ACTION: &str = "add repository";
    let outcome = state
        .rag
        .ingest(IngestRequest::github_repo(&repo))
        .await
        .map_err(|error| ApiError::internal(ACTION, &error))?;
    let added = state
        .registry
        .add(repo.clone())
        .await
        .map_err(|error| ApiError::internal(ACTION, &error))?;

    let message = if added.already_present {
        MSG_ALREADY_ADDED
    } else {
        MSG_ADDED
    };
    tracing::info!(
        repo = %repo,
        documents = outcome.documents,
        chunks = outcome.chunks,
        already_present = added.already_present,
        "Add repository request completed"
    );
    Ok(Json(AddRepoResponse { message, repo }))
}

/// List registered repositories.
async fn get_repos(State(state): State<AppState>) -> Json<ReposResponse> {
    Json(ReposResponse {
        repos: state.registry.load().await,
    })
}

/// Answer a question scoped to one repository.
async fn chat(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let fields = parse_fields(body);
    let raw = required_field(&fields, "repo_url")?;
    let query = required_field(&fields, "query")?;
    let repo = RepoId::parse(raw)?;

    let answer = state
        .rag
        .answer(query, &ScopeFilter::repo(&repo))
        .await
        .map_err(|error| ApiError::internal("generate answer", &error))?;
    tracing::info!(repo = %repo, answer_chars = answer.len(), "Chat request completed");
    Ok(Json(ChatResponse { answer }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

fn parse_fields(body: Result<Bytes, BytesRejection>) -> Map<String, Value> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(
                status = %rejection.status(),
                error = %rejection,
                "Request body could not be read; treating it as empty"
            );
            return Map::new();
        }
    };
    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => Map::new(),
        Err(error) => {
            if !body.is_empty() {
                tracing::debug!(error = %error, "Ignoring unparseable request body");
            }
            Map::new()
        }
    }
}

fn required_field<'a>(
    fields: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, ApiError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingField(name))
}
