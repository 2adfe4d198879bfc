use std::error::Error as StdError;

/// Crate-wide result type for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Domain error taxonomy. Every variant maps to exactly one HTTP status at
/// the gateway edge; queue-side code only consults [`Error::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed body, schema violation, bad attachment URL, oversize base64.
    #[error("{message}")]
    BadRequest { message: String },

    /// Missing or invalid API key.
    #[error("{message}")]
    Unauthorized { message: String },

    /// Key valid but scope lacking, or a cross-tenant access attempt.
    #[error("{message}")]
    Forbidden { message: String },

    /// Project, platform config, job, or message not found.
    #[error("{message}")]
    NotFound { message: String },

    /// Slug collision, deletion blocked by active references.
    #[error("{message}")]
    Conflict { message: String },

    /// Provider does not implement the requested capability.
    #[error("{message}")]
    Unsupported { message: String },

    /// Global throttle or provider back-pressure.
    #[error("{message}")]
    RateLimited { message: String },

    /// Upstream platform error. `retryable` decides queue backoff.
    #[error("provider error: {message}")]
    Provider { message: String, retryable: bool },

    /// Unexpected failure, logged with the request correlation id.
    #[error("{context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
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
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
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
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn provider(message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            message: message.into(),
            retryable,
        }
    }

    #[must_use]
    pub fn internal(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Internal {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable code used in the HTTP error envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "BadRequest",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::Forbidden { .. } => "Forbidden",
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Unsupported { .. } => "Unsupported",
            Self::RateLimited { .. } => "RateLimited",
            Self::Provider { .. } => "ProviderError",
            Self::Internal { .. } => "Internal",
        }
    }

    /// HTTP status the gateway maps this error to.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::Unsupported { .. } => 422,
            Self::RateLimited { .. } => 429,
            Self::Provider { retryable, .. } => {
                if *retryable {
                    503
                } else {
                    502
                }
            },
            Self::Internal { .. } => 500,
        }
    }

    /// Whether the dispatch queue should back off and try again.
    ///
    /// Rate limits and transient provider failures retry; everything else is
    /// terminal for the job.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Provider {
                    retryable: true,
                    ..
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(Error::bad_request("x").http_status(), 400);
        assert_eq!(Error::unauthorized("x").http_status(), 401);
        assert_eq!(Error::forbidden("x").http_status(), 403);
        assert_eq!(Error::not_found("x").http_status(), 404);
        assert_eq!(Error::conflict("x").http_status(), 409);
        assert_eq!(Error::unsupported("x").http_status(), 422);
        assert_eq!(Error::rate_limited("x").http_status(), 429);
        assert_eq!(Error::provider("x", true).http_status(), 503);
        assert_eq!(Error::provider("x", false).http_status(), 502);
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(Error::rate_limited("slow down").is_retryable());
        assert!(Error::provider("gateway timeout", true).is_retryable());
        assert!(!Error::provider("invalid token", false).is_retryable());
        assert!(!Error::unsupported("no reactions").is_retryable());
        assert!(!Error::bad_request("bad").is_retryable());
    }
}
