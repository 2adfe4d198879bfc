use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Typed provider/adapter errors. The retry split drives queue backoff:
/// `RateLimited` and `Transient` retry, everything else is terminal.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Credentials fail the per-platform schema or are rejected upstream.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Capability not implemented by this provider.
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Provider rejected authentication at call time.
    #[error("provider authentication failed: {message}")]
    Unauthorized { message: String },

    /// Provider back-pressure (HTTP 429).
    #[error("provider rate limited: {message}")]
    RateLimited { message: String },

    /// Timeout or provider 5xx; worth a retry.
    #[error("transient provider failure: {message}")]
    Transient { message: String },

    /// Definitive provider rejection (4xx other than 429/401).
    #[error("provider rejected request: {message}")]
    Permanent { message: String },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl PlatformError {
    #[must_use]
    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::InvalidCredentials {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Classify an HTTP status from a provider API.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => Self::Unauthorized { message },
            429 => Self::RateLimited { message },
            500..=599 => Self::Transient { message },
            _ => Self::Permanent { message },
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }
}

impl From<PlatformError> for gridkit_common::Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::InvalidCredentials { message } => {
                gridkit_common::Error::bad_request(format!("invalid credentials: {message}"))
            },
            PlatformError::Unsupported { message } => gridkit_common::Error::unsupported(message),
            PlatformError::RateLimited { message } => {
                gridkit_common::Error::provider(message, true)
            },
            PlatformError::Transient { message } => gridkit_common::Error::provider(message, true),
            PlatformError::Unauthorized { message } | PlatformError::Permanent { message } => {
                gridkit_common::Error::provider(message, false)
            },
            PlatformError::SerdeJson(e) => gridkit_common::Error::internal("platform payload", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            PlatformError::from_status(401, ""),
            PlatformError::Unauthorized { .. }
        ));
        assert!(matches!(
            PlatformError::from_status(429, ""),
            PlatformError::RateLimited { .. }
        ));
        assert!(matches!(
            PlatformError::from_status(503, ""),
            PlatformError::Transient { .. }
        ));
        assert!(matches!(
            PlatformError::from_status(400, ""),
            PlatformError::Permanent { .. }
        ));
    }

    #[test]
    fn retryability_split() {
        assert!(PlatformError::from_status(429, "").is_retryable());
        assert!(PlatformError::from_status(500, "").is_retryable());
        assert!(!PlatformError::from_status(401, "").is_retryable());
        assert!(!PlatformError::from_status(404, "").is_retryable());
        assert!(!PlatformError::unsupported("x").is_retryable());
    }
}
