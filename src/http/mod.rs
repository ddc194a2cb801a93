//! HTTP surface
//!
//! Thin axum layer over the stores, the ingestion pipeline, and the dialogue
//! engine. Handlers return `Result<_, Error>`; every error body is a short
//! non-leaking `{"detail": ...}` object. Internal detail stays in the logs.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::limit::RateLimiter;
use crate::persona::{DialogueEngine, IngestionPipeline};
use crate::provider::SharedProvider;
use crate::store::{PersonaStore, Role, User, UserStore};

pub mod personas;
pub mod users;

/// Slack on top of the PDF cap for multipart framing overhead.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────

/// Everything the handlers need, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub personas: PersonaStore,
    pub ingestion: IngestionPipeline,
    pub dialogue: Arc<DialogueEngine>,
    pub keys: TokenKeys,
    pub upload_limiter: Arc<RateLimiter>,
    pub ask_limiter: Arc<RateLimiter>,
    max_pdf_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, pool: SqlitePool, provider: SharedProvider) -> Self {
        let users = UserStore::new(pool.clone());
        let personas = PersonaStore::new(pool, config.ingest.max_persona_chars);
        let ingestion = IngestionPipeline::new(personas.clone(), config.ingest.max_pdf_bytes);
        let dialogue = Arc::new(DialogueEngine::new(
            personas.clone(),
            provider,
            config.provider.temperature,
            config.provider.max_tokens,
        ));

        Self {
            users,
            personas,
            ingestion,
            dialogue,
            keys: TokenKeys::new(&config.auth.secret_key, config.auth.token_ttl_minutes),
            upload_limiter: Arc::new(RateLimiter::per_minute(config.limits.upload_per_minute)),
            ask_limiter: Arc::new(RateLimiter::per_minute(config.limits.ask_per_minute)),
            max_pdf_bytes: config.ingest.max_pdf_bytes,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Router / server
// ─────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_pdf_bytes + BODY_LIMIT_SLACK;

    Router::new()
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/personas/upload", post(personas::upload))
        .route("/personas/process-question", post(personas::process_question))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and run the server until the listener fails.
pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "Persona server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// ─────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::UsernameTaken
            | Error::UnsupportedMediaType
            | Error::PayloadTooLarge { .. }
            | Error::NoExtractableText => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials | Error::InvalidToken | Error::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NoPersona => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() || status == StatusCode::BAD_GATEWAY {
            error!(error = %self, status = %status, "Request failed");
        }

        (status, Json(json!({ "detail": self.public_message() }))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────────────

/// The authenticated caller: a verified bearer token whose subject resolves
/// to a live user row. A subject that no longer exists is treated exactly
/// like a bad token.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::InvalidToken)?;

        let token = header.strip_prefix("Bearer ").ok_or(Error::InvalidToken)?;
        let claims = state.keys.verify(token)?;

        let user = state
            .users
            .find_by_id(&claims.sub)
            .await?
            .ok_or(Error::InvalidToken)?;

        Ok(AuthUser(user))
    }
}

/// Like `AuthUser`, but the caller must hold the admin role.
pub struct RequireAdmin(pub User);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(Error::Forbidden);
        }
        Ok(RequireAdmin(user))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
