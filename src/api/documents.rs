use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{save_and_index, ApiError, AppState, AuthUser};
use crate::db::{CollectionRecord, DocumentRecord};

#[derive(Deserialize)]
pub struct CollectionCreate {
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentUploadResponse {
    pub message: String,
    pub documents: Vec<DocumentRecord>,
}

/// POST /api/v1/documents/collections
pub async fn create_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(data): Json<CollectionCreate>,
) -> Result<(StatusCode, Json<CollectionRecord>), ApiError> {
    let collection = state.db.create_collection(&user.id, data.name.as_deref())?;
    Ok((StatusCode::CREATED, Json(collection)))
}

/// GET /api/v1/documents/collections
pub async fn list_collections(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<CollectionRecord>>, ApiError> {
    Ok(Json(state.db.collections_for_user(&user.id)?))
}

/// GET /api/v1/documents/collections/{collection_id}
pub async fn get_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(collection_id): Path<String>,
) -> Result<Json<CollectionRecord>, ApiError> {
    let collection = state
        .db
        .collection_for_user(&collection_id, &user.id)?
        .ok_or_else(not_found)?;
    Ok(Json(collection))
}

/// DELETE /api/v1/documents/collections/{collection_id}
///
/// Drops the stored files, the rows, and the vector collection. Chats
/// pointing at the collection lose the reference but survive.
pub async fn delete_collection(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(collection_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .collection_for_user(&collection_id, &user.id)?
        .ok_or_else(not_found)?;

    state.db.detach_collection_from_chats(&collection_id)?;

    for document in state.db.documents_in_collection(&collection_id)? {
        state.files.delete(&document.file_path);
        state.db.delete_document(&document.id)?;
    }

    if let Err(err) = state.vectors.delete_collection(&collection_id).await {
        warn!("Failed to delete vector collection {}: {}", collection_id, err);
    }
    state.db.delete_collection(&collection_id)?;

    Ok(Json(json!({ "message": "deleted" })))
}

/// POST /api/v1/documents/collections/{collection_id}/documents
pub async fn upload_documents(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(collection_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<DocumentUploadResponse>, ApiError> {
    state
        .db
        .collection_for_user(&collection_id, &user.id)?
        .ok_or_else(|| ApiError::not_found("Collection not found"))?;

    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let original = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        documents.push(save_and_index(&state, &collection_id, original.as_deref(), &bytes).await?);
    }

    Ok(Json(DocumentUploadResponse {
        message: format!("{} uploaded", documents.len()),
        documents,
    }))
}

/// GET /api/v1/documents/collections/{collection_id}/documents
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(collection_id): Path<String>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    state
        .db
        .collection_for_user(&collection_id, &user.id)?
        .ok_or_else(|| ApiError::not_found("Collection not found"))?;
    Ok(Json(state.db.documents_in_collection(&collection_id)?))
}

/// DELETE /api/v1/documents/{document_id}
///
/// Removes the stored file and the row. Vectors already indexed from
/// the document are left in the collection.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let document = state.db.document_by_id(&document_id)?.ok_or_else(not_found)?;

    state
        .db
        .collection_for_user(&document.collection_id, &user.id)?
        .ok_or_else(|| ApiError::forbidden("Not authorized"))?;

    state.files.delete(&document.file_path);
    state.db.delete_document(&document.id)?;

    Ok(Json(json!({ "message": "deleted" })))
}

fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
