//! The stable JSON error envelope: `{message, code, details?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use gridkit_common::{Error, validate::FieldError};

#[derive(Debug)]
pub struct ApiError {
    error: Error,
    details: Option<serde_json::Value>,
}

impl ApiError {
    #[must_use]
    pub fn new(error: Error) -> Self {
        Self {
            error,
            details: None,
        }
    }

    /// Schema-validation failure carrying the per-field error list.
    #[must_use]
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self {
            error: Error::bad_request("request validation failed"),
            details: serde_json::to_value(errors).ok(),
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.error.code()
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl From<gridkit_store::StoreError> for ApiError {
    fn from(error: gridkit_store::StoreError) -> Self {
        Self::new(error.into())
    }
}

impl From<gridkit_queue::QueueError> for ApiError {
    fn from(error: gridkit_queue::QueueError) -> Self {
        Self::new(error.into())
    }
}

impl From<gridkit_platforms::PlatformError> for ApiError {
    fn from(error: gridkit_platforms::PlatformError) -> Self {
        Self::new(error.into())
    }
}

impl From<gridkit_attachments::AttachmentError> for ApiError {
    fn from(error: gridkit_attachments::AttachmentError) -> Self {
        Self::new(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.error.code(), error = %self.error, "request failed");
        }

        let mut body = serde_json::json!({
            "message": self.error.to_string(),
            "code": self.error.code(),
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_code_and_details() {
        let err = ApiError::validation(vec![FieldError {
            path: "targets".into(),
            message: "at least one target required".into(),
        }]);
        assert_eq!(err.code(), "BadRequest");
        assert!(err.details.is_some());
    }
}
