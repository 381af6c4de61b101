//! Conversation lifecycle endpoints

use atendo_shared::{Conversation, ConversationMode, ConversationStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub mode: Option<ConversationMode>,
    /// Staff may open a conversation on a client's behalf
    #[serde(default)]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub attendant_id: Uuid,
}

/// Open a new pending conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let client_id = match body.client_id {
        Some(client_id) if client_id != auth.user_id => {
            if !auth.is_staff() {
                return Err(ApiError::Forbidden);
            }
            client_id
        }
        _ => auth.user_id,
    };

    let mode = body.mode.unwrap_or(ConversationMode::AiAgent);
    let conversation = state.conversations.create(client_id, mode).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Claim a pending conversation for the calling attendant
pub async fn claim_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden);
    }

    let conversation = state
        .conversations
        .claim(conversation_id, auth.user_id)
        .await?;
    Ok(Json(conversation))
}

/// Close, reopen, or return a conversation to the pending queue
pub async fn change_conversation_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<ChangeStatusRequest>,
) -> Result<Json<Conversation>, ApiError> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden);
    }

    let conversation = state
        .conversations
        .change_status(conversation_id, body.status)
        .await?;
    Ok(Json(conversation))
}

/// Hand an attending conversation to a different attendant
pub async fn transfer_conversation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<TransferRequest>,
) -> Result<Json<Conversation>, ApiError> {
    if !auth.is_staff() {
        return Err(ApiError::Forbidden);
    }

    let conversation = state
        .conversations
        .transfer(conversation_id, body.attendant_id)
        .await?;
    Ok(Json(conversation))
}
