use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{save_and_index, ApiError, AppState, AuthUser};
use crate::db::{ChatRecord, MessageRecord};
use crate::providers::ChatMessage;

/// Placeholder names replaced by a generated title after the first exchange.
const PLACEHOLDER_NAMES: [&str; 3] = ["New Chat", "Documents", ""];

#[derive(Deserialize)]
pub struct ChatCreate {
    #[serde(default = "default_chat_name")]
    pub name: Option<String>,
}

fn default_chat_name() -> Option<String> {
    Some("New Chat".to_string())
}

#[derive(Deserialize)]
pub struct ChatUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct MessageCreate {
    pub content: String,
}

#[derive(Serialize)]
pub struct ChatWithMessages {
    pub chat: ChatRecord,
    pub messages: Vec<MessageRecord>,
}

#[derive(Serialize)]
pub struct AiResponse {
    pub user_message: MessageRecord,
    pub ai_message: MessageRecord,
    /// Set when the chat was renamed from its placeholder.
    pub chat_name: Option<String>,
}

/// POST /api/v1/chats
///
/// Multipart: an optional `data` field with chat JSON, plus any number
/// of `files`. Files get a fresh collection the chat is bound to.
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut requested_name: Option<String> = None;
    let mut uploads: Vec<(Option<String>, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name().map(str::to_string).as_deref() {
            Some("data") => {
                let text = field.text().await?;
                if let Ok(data) = serde_json::from_str::<ChatCreate>(&text) {
                    requested_name = data.name.filter(|name| !name.is_empty());
                }
            }
            Some("files") => {
                let original = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                uploads.push((original, bytes));
            }
            _ => {}
        }
    }

    let mut collection_id = None;
    let mut documents = Vec::new();

    if !uploads.is_empty() {
        let collection_name = requested_name
            .clone()
            .unwrap_or_else(|| "Documents".to_string());
        let collection = state.db.create_collection(&user.id, Some(&collection_name))?;
        for (original, bytes) in &uploads {
            documents.push(save_and_index(&state, &collection.id, original.as_deref(), bytes).await?);
        }
        collection_id = Some(collection.id);
    }

    let chat_name = requested_name.unwrap_or_else(|| "New Chat".to_string());
    let chat = state
        .db
        .create_chat(&user.id, &chat_name, collection_id.as_deref())?;

    Ok(Json(
        json!({ "message": "Chat created", "chat": chat, "documents": documents }),
    ))
}

/// GET /api/v1/chats
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ChatRecord>>, ApiError> {
    Ok(Json(state.db.chats_for_user(&user.id)?))
}

/// GET /api/v1/chats/{chat_id}
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatWithMessages>, ApiError> {
    let chat = state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;
    let messages = state.db.messages_for_chat(&chat_id)?;
    Ok(Json(ChatWithMessages { chat, messages }))
}

/// PUT /api/v1/chats/{chat_id}
pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
    Json(data): Json<ChatUpdate>,
) -> Result<Json<ChatRecord>, ApiError> {
    state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;

    state
        .db
        .update_chat(&chat_id, data.name.as_deref(), data.description.as_deref())?;

    let chat = state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;
    Ok(Json(chat))
}

/// DELETE /api/v1/chats/{chat_id}
///
/// Removes the chat and its messages. The collection goes too once no
/// other chat references it; uploaded files stay on disk.
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let chat = state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;

    state.db.delete_messages_for_chat(&chat_id)?;
    state.db.delete_chat(&chat_id)?;

    if let Some(collection_id) = chat.collection_id {
        if state.db.chats_using_collection(&collection_id)? == 0 {
            if let Err(err) = state.vectors.delete_collection(&collection_id).await {
                warn!("Failed to delete vector collection {}: {}", collection_id, err);
            }
            state.db.delete_documents_in_collection(&collection_id)?;
            state.db.delete_collection(&collection_id)?;
        }
    }

    Ok(Json(json!({ "message": "deleted" })))
}

/// POST /api/v1/chats/{chat_id}/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
    Json(data): Json<MessageCreate>,
) -> Result<Json<AiResponse>, ApiError> {
    let chat = state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;

    let is_first_message = state.db.message_count(&chat_id)? == 0;

    let user_message = state.db.create_message(&chat_id, &data.content, "user", None)?;

    // The history handed to the model includes the turn just saved.
    let history: Vec<ChatMessage> = state
        .db
        .messages_for_chat(&chat_id)?
        .iter()
        .filter_map(|message| match message.role.as_str() {
            "user" => Some(ChatMessage::user(message.content.clone())),
            "assistant" => Some(ChatMessage::assistant(message.content.clone())),
            _ => None,
        })
        .collect();

    let reply = state
        .chat
        .respond(&data.content, chat.collection_id.as_deref(), &history)
        .await;

    let ai_message =
        state
            .db
            .create_message(&chat_id, &reply.content, "assistant", Some(&reply.sources))?;

    let mut chat_name = None;
    let current_name = chat.name.as_deref().unwrap_or_default();
    if is_first_message && PLACEHOLDER_NAMES.contains(&current_name) {
        let title = state.titles.title(&data.content, &reply.content).await;
        match state.db.update_chat(&chat_id, Some(&title), None) {
            Ok(()) => chat_name = Some(title),
            Err(err) => warn!("Failed to rename chat {}: {}", chat_id, err),
        }
    }

    Ok(Json(AiResponse {
        user_message,
        ai_message,
        chat_name,
    }))
}

/// GET /api/v1/chats/{chat_id}/messages
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;
    Ok(Json(state.db.messages_for_chat(&chat_id)?))
}

/// POST /api/v1/chats/{chat_id}/upload
///
/// Add files to the chat's collection, creating one if the chat has
/// none yet.
pub async fn upload_to_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(chat_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let chat = state
        .db
        .chat_for_user(&chat_id, &user.id)?
        .ok_or_else(chat_not_found)?;

    let collection_id = match chat.collection_id {
        Some(id) => id,
        None => {
            let collection = state.db.create_collection(&user.id, Some("Chat docs"))?;
            state.db.set_chat_collection(&chat_id, &collection.id)?;
            collection.id
        }
    };

    let mut documents = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let original = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        documents.push(save_and_index(&state, &collection_id, original.as_deref(), &bytes).await?);
    }

    Ok(Json(json!({ "message": "Uploaded", "documents": documents })))
}

fn chat_not_found() -> ApiError {
    ApiError::not_found("Chat not found")
}
