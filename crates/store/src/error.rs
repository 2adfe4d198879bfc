use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    /// Unique-constraint or referential conflict surfaced to the caller
    /// (slug collision, duplicate key prefix, blocked deletion).
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl From<StoreError> for gridkit_common::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => gridkit_common::Error::not_found(message),
            StoreError::Conflict(message) => gridkit_common::Error::conflict(message),
            other => gridkit_common::Error::internal("store failure", other),
        }
    }
}
