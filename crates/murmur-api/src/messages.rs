use axum::{
    Extension, Json,
    extract::{Query, State, rejection::{JsonRejection, QueryRejection}},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use murmur_db::store::DEFAULT_HISTORY_LIMIT;
use murmur_types::api::{
    DeleteConversationResponse, MarkReadRequest, MarkReadResponse, SendMessageRequest,
    UnreadResponse,
};
use murmur_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageQuery {
    pub conversation_with: Option<String>,
    pub limit: Option<u32>,
}

/// `GET /messages`: history with `conversationWith`, otherwise the caller's
/// conversation list.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;

    match query.conversation_with {
        Some(other) => {
            let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
            let messages = state
                .store
                .history(me.as_str(), &other, limit)
                .await
                .map_err(|e| ApiError::from_store(e, "Error fetching messages"))?;
            Ok(Json(messages).into_response())
        }
        None => {
            let conversations = state
                .store
                .conversations_for(me.as_str())
                .await
                .map_err(|e| ApiError::from_store(e, "Error fetching messages"))?;
            Ok(Json(conversations).into_response())
        }
    }
}

/// `POST /messages`: durable send for clients without a live channel. The
/// receiver still gets the message live if they are connected.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let message = state
        .store
        .send(me.as_str(), &req.receiver_id, &req.content)
        .await
        .map_err(|e| ApiError::from_store(e, "Error sending message"))?;

    let delivered = state
        .presence
        .send_to_user(&message.receiver_id, GatewayEvent::ReceiveMessage(message.clone()))
        .await;
    debug!(
        "REST send {} -> {} ({})",
        me,
        message.receiver_id,
        if delivered { "live" } else { "stored" }
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// `POST /messages/read`
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    payload: Result<Json<MarkReadRequest>, JsonRejection>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let Json(req) = payload?;

    let updated = state
        .store
        .mark_read(me.as_str(), &req.sender_id)
        .await
        .map_err(|e| ApiError::from_store(e, "Error marking messages as read"))?;

    Ok(Json(MarkReadResponse { updated }))
}

/// `DELETE /messages/delete?conversationWith=<id>`
pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let Query(query) = query?;
    let other = query
        .conversation_with
        .ok_or_else(|| ApiError::Validation("Conversation partner ID is required".into()))?;

    let deleted_count = state
        .store
        .delete_conversation(me.as_str(), &other)
        .await
        .map_err(|e| ApiError::from_store(e, "Error deleting conversation"))?;

    Ok(Json(DeleteConversationResponse {
        message: "Conversation deleted successfully".into(),
        deleted_count,
    }))
}

/// `GET /messages/unread`
pub async fn unread(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let unread = state
        .store
        .unread_total(me.as_str())
        .await
        .map_err(|e| ApiError::from_store(e, "Error fetching unread count"))?;

    Ok(Json(UnreadResponse { unread }))
}
