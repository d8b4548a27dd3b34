//! HTTP surface of the service: routing, shared state, authentication
//! extraction, and the error-to-response mapping.

pub mod auth;
pub mod chats;
pub mod documents;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use log::{error, info};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::auth::verify_access_token;
use crate::chat::ChatEngine;
use crate::config::ServerConfig;
use crate::db::{Database, DocumentRecord, User};
use crate::indexer::DocumentIndexer;
use crate::storage::{format_size, FileStore};
use crate::title::TitleGenerator;
use crate::vector_store::VectorStore;

pub const APP_NAME: &str = "ContextBase API";

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppState {
    pub config: ServerConfig,
    pub db: Database,
    pub files: FileStore,
    pub indexer: DocumentIndexer,
    pub chat: ChatEngine,
    pub titles: TitleGenerator,
    pub vectors: Arc<dyn VectorStore>,
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    // The web client calls the chats collection route with a trailing
    // slash; axum treats the two spellings as distinct paths.
    let chat_collection = post(chats::create_chat).get(chats::list_chats);

    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/chats", chat_collection.clone())
        .route("/chats/", chat_collection)
        .route(
            "/chats/{chat_id}",
            get(chats::get_chat)
                .put(chats::update_chat)
                .delete(chats::delete_chat),
        )
        .route(
            "/chats/{chat_id}/messages",
            post(chats::send_message).get(chats::get_messages),
        )
        .route("/chats/{chat_id}/upload", post(chats::upload_to_chat))
        .route(
            "/documents/collections",
            post(documents::create_collection).get(documents::list_collections),
        )
        .route(
            "/documents/collections/{collection_id}",
            get(documents::get_collection).delete(documents::delete_collection),
        )
        .route(
            "/documents/collections/{collection_id}/documents",
            post(documents::upload_documents).get(documents::list_documents),
        )
        .route("/documents/{document_id}", delete(documents::delete_document));

    let upload_limit = state.config.max_upload_size;

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(CorsLayer::very_permissive())
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "service": APP_NAME }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

/// API failure carrying an HTTP status and a client-facing detail
/// message. Everything unexpected collapses into a logged 500.
pub enum ApiError {
    Status(StatusCode, String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        ApiError::Status(StatusCode::BAD_REQUEST, detail.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        ApiError::Status(StatusCode::UNAUTHORIZED, detail.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        ApiError::Status(StatusCode::FORBIDDEN, detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiError::Status(StatusCode::NOT_FOUND, detail.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Status(status, detail) => {
                let body = Json(json!({ "detail": detail }));
                if status == StatusCode::UNAUTHORIZED {
                    (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
                } else {
                    (status, body).into_response()
                }
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::Status(StatusCode::BAD_REQUEST, err.to_string())
    }
}

/// The authenticated user, extracted from the bearer token.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(invalid_credentials)?;
        let email = verify_access_token(token, &state.config.secret_key)
            .ok_or_else(invalid_credentials)?;
        let user = state
            .db
            .user_by_email(&email)?
            .ok_or_else(invalid_credentials)?;
        Ok(AuthUser(user))
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid credentials")
}

/// Store one upload on disk, record it, and index it. Indexing failures
/// are logged but do not fail the request; the document row stays.
pub(crate) async fn save_and_index(
    state: &AppState,
    collection_id: &str,
    original_name: Option<&str>,
    bytes: &[u8],
) -> Result<DocumentRecord, ApiError> {
    let saved = state.files.save(original_name, bytes)?;
    let size = format_size(saved.size);
    let document = state.db.create_document(
        collection_id,
        Some(&saved.original_name),
        &saved.path,
        Some(&size),
    )?;

    match state.indexer.index(&saved.path, collection_id).await {
        Ok(report) => info!(
            "Indexed {} ({} chunks) into collection {}",
            saved.path, report.chunks_indexed, collection_id
        ),
        Err(err) => error!("Indexing {} failed: {}", saved.path, err),
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_has_no_challenge_header() {
        let response = ApiError::not_found("Chat not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_unauthorized_carries_challenge_header() {
        let response = ApiError::unauthorized("Invalid credentials").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn test_internal_errors_stay_opaque() {
        let response =
            ApiError::Internal(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
