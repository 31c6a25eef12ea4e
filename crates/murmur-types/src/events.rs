use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// The connection is now bound to `user_id`
    Authenticated { user_id: UserId },

    /// Authentication was refused; the connection stays unauthenticated
    AuthError { error: String },

    /// A message addressed to this user was stored
    ReceiveMessage(Message),

    /// Acknowledgment to the sender carrying the stored message
    MessageSent(Message),

    /// The last send from this connection failed; nothing was delivered
    MessageError { error: String },

    /// A counterparty started typing to this user
    UserTyping { user_id: UserId },

    /// A counterparty stopped typing to this user
    UserStoppedTyping { user_id: UserId },
}

impl GatewayEvent {
    /// Wire name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated { .. } => "authenticated",
            Self::AuthError { .. } => "auth_error",
            Self::ReceiveMessage(_) => "receive_message",
            Self::MessageSent(_) => "message_sent",
            Self::MessageError { .. } => "message_error",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStoppedTyping { .. } => "user_stopped_typing",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Identities arrive as raw strings so the gateway can answer a malformed
/// id with an error event instead of dropping the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Bind this connection to a user. `token` is the bearer JWT whose
    /// subject must equal `user_id`.
    Authenticate { user_id: String, token: String },

    /// Persist a message and route it to the receiver
    SendMessage {
        receiver_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
    },

    /// Start showing a typing indicator to `receiver_id`
    TypingStart { receiver_id: String },

    /// Stop showing the typing indicator to `receiver_id`
    TypingStop { receiver_id: String },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::SendMessage { .. } => "send_message",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
        }
    }
}
