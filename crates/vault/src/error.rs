use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The process-wide secret is absent or not 64 hex chars.
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    /// A stored blob is not a parseable `iv:tag:ciphertext` hex triple.
    #[error("malformed ciphertext blob: {0}")]
    Malformed(String),

    /// Authentication tag mismatch or cipher failure.
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}
