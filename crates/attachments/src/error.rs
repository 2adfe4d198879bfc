use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttachmentError>;

/// Attachment validation and fetch failures. Everything except `Download`
/// maps to BadRequest at the HTTP edge; downloads that fail after
/// validation are provider territory.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("invalid attachment url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url protocol: {0}")]
    UnsupportedScheme(String),

    #[error("blocked host: {0}")]
    BlockedHost(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("attachment too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("attachment download failed: {0}")]
    Download(String),
}

impl From<AttachmentError> for gridkit_common::Error {
    fn from(err: AttachmentError) -> Self {
        match err {
            AttachmentError::Download(message) => gridkit_common::Error::provider(message, true),
            other => gridkit_common::Error::bad_request(other.to_string()),
        }
    }
}
