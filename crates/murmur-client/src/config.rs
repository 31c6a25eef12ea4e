use std::time::Duration;

use murmur_types::UserId;

/// Everything a client session needs to reach the server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP origin of the server, e.g. `http://127.0.0.1:3000`
    pub base_url: String,
    pub user_id: UserId,
    /// Bearer token from the auth collaborator
    pub token: String,

    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,

    /// Quiet period after the last keystroke before `typing_stop`
    pub typing_idle: Duration,
    /// How long a remote typing indicator survives without a stop event
    pub typing_expiry: Duration,

    /// Delay before re-reading history after a REST fallback send
    pub refetch_delay: Duration,
    pub history_limit: u32,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
            token: token.into(),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            typing_idle: Duration::from_secs(1),
            typing_expiry: Duration::from_secs(5),
            refetch_delay: Duration::from_secs(1),
            history_limit: 50,
        }
    }

    /// WebSocket endpoint derived from `base_url`.
    pub fn gateway_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/gateway", ws_base)
    }
}
