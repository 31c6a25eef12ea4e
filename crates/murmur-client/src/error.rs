use thiserror::Error;

/// Failure surfaced to client code. Cloneable so the view model can keep
/// the last one around for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Input refused locally or by the server; retrying won't help
    #[error("{0}")]
    Validation(String),

    #[error("not authenticated")]
    Auth,

    /// Server could not serve the request; the caller may retry
    #[error("server error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Classify a non-2xx REST response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth,
            400..=499 => Self::Validation(message),
            _ => Self::Storage(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Transport(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
