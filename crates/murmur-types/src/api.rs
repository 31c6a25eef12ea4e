use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Bearer token claims issued by the auth collaborator. Shared by the REST
/// middleware and the gateway's `authenticate` check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkReadRequest {
    pub sender_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConversationResponse {
    pub message: String,
    pub deleted_count: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct UnreadResponse {
    pub unread: u64,
}

/// Body of every non-2xx REST response.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}
