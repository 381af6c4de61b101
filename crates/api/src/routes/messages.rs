//! Message thread endpoints

use atendo_shared::{Message, MessageKind, Reaction};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, messages::NewMessage, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub kind: Option<MessageKind>,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    #[serde(default)]
    pub forwarded_from_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Serialize)]
pub struct ReactionResponse {
    /// `None` after a toggle removed the reaction
    pub reaction: Option<Reaction>,
}

/// The conversation's message feed, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let feed = state.messages.feed(conversation_id).await?;
    Ok(Json(feed))
}

/// Append a message to a conversation
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    if body.content.trim().is_empty() && body.media_url.is_none() {
        return Err(ApiError::Validation(
            "message needs content or media".to_string(),
        ));
    }

    let message = state
        .messages
        .append(NewMessage {
            conversation_id,
            sender_id: auth.user_id,
            kind: body.kind.unwrap_or(MessageKind::Text),
            content: body.content,
            media_url: body.media_url,
            media_name: body.media_name,
            reply_to_id: body.reply_to_id,
            forwarded_from_id: body.forwarded_from_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Soft-delete a message; only its author or staff may do so
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let message = state.messages.get(message_id).await?;
    if message.sender_id != auth.user_id && !auth.is_staff() {
        return Err(ApiError::Forbidden);
    }

    state.messages.soft_delete(message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Toggle the caller's reaction on a message
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactionRequest>,
) -> Result<Json<ReactionResponse>, ApiError> {
    if body.emoji.trim().is_empty() {
        return Err(ApiError::Validation("emoji must not be empty".to_string()));
    }

    let reaction = state
        .messages
        .toggle_reaction(auth.user_id, message_id, body.emoji.trim())
        .await?;
    Ok(Json(ReactionResponse { reaction }))
}
