use murmur_types::UserIdError;
use murmur_types::models::ContentError;
use thiserror::Error;

/// Failure of a Message Store operation.
///
/// `Validation` means the input was refused before anything was written and
/// retrying is pointless. `Storage` means the database could not serve the
/// request; the caller may offer a retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("storage unavailable: {0:#}")]
    Storage(anyhow::Error),
}

impl StoreError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}

impl From<ContentError> for StoreError {
    fn from(err: ContentError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Names which id was malformed, e.g. "invalid receiver id: user id is empty".
pub(crate) fn invalid_id(field: &str, err: UserIdError) -> StoreError {
    StoreError::Validation(format!("invalid {field} id: {err}"))
}
