//! Declarative validation of inbound payloads.
//!
//! Validation failures are collected as `{path, message}` pairs rather than
//! aborting on the first problem, so a caller fixing a request sees every
//! defect at once.

use {
    chrono::Utc,
    serde::Serialize,
    url::Url,
};

use crate::types::SendRequest;

/// One field-level validation failure.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Project slugs are lowercase alphanumeric with hyphens.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate a send request against the wire schema constraints.
///
/// Checks structure only; platform ownership and activation are enforced
/// separately against the store.
pub fn validate_send_request(request: &SendRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if request.targets.is_empty() {
        errors.push(FieldError::new("targets", "at least one target required"));
    }
    for (i, target) in request.targets.iter().enumerate() {
        if target.platform_id.trim().is_empty() {
            errors.push(FieldError::new(
                format!("targets[{i}].platformId"),
                "platformId must not be empty",
            ));
        }
        if target.id.trim().is_empty() {
            errors.push(FieldError::new(
                format!("targets[{i}].id"),
                "target id must not be empty",
            ));
        }
    }

    let content = &request.content;
    let has_text = content.text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if !has_text && content.attachments.is_empty() {
        errors.push(FieldError::new(
            "content",
            "at least one of text or attachments required",
        ));
    }

    for (i, attachment) in content.attachments.iter().enumerate() {
        match (&attachment.url, &attachment.data) {
            (None, None) => errors.push(FieldError::new(
                format!("content.attachments[{i}]"),
                "attachment requires url or data",
            )),
            (Some(url), _) => {
                if !is_absolute_http_url(url) {
                    errors.push(FieldError::new(
                        format!("content.attachments[{i}].url"),
                        "url must be absolute http(s)",
                    ));
                }
            },
            _ => {},
        }
    }

    for (i, button) in content.buttons.iter().enumerate() {
        if button.text.trim().is_empty() {
            errors.push(FieldError::new(
                format!("content.buttons[{i}].text"),
                "button text must not be empty",
            ));
        }
    }

    if let Some(options) = &request.options
        && let Some(scheduled) = options.scheduled
        && scheduled <= Utc::now()
    {
        errors.push(FieldError::new(
            "options.scheduled",
            "scheduled time must be in the future",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn is_absolute_http_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{Attachment, MessageContent, SendOptions, SendTarget, TargetType},
        chrono::Duration,
    };

    fn request_with_text(text: &str) -> SendRequest {
        SendRequest {
            targets: vec![SendTarget {
                platform_id: "pc_1".into(),
                target_type: TargetType::Channel,
                id: "C1".into(),
            }],
            content: MessageContent {
                text: Some(text.into()),
                ..Default::default()
            },
            options: None,
            metadata: None,
        }
    }

    #[test]
    fn slug_rules() {
        assert!(is_valid_slug("acme-prod-2"));
        assert!(!is_valid_slug("Acme"));
        assert!(!is_valid_slug("acme_prod"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn minimal_text_request_passes() {
        assert!(validate_send_request(&request_with_text("hello")).is_ok());
    }

    #[test]
    fn empty_targets_rejected() {
        let mut req = request_with_text("hello");
        req.targets.clear();
        let errors = validate_send_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "targets"));
    }

    #[test]
    fn content_requires_text_or_attachments() {
        let mut req = request_with_text("");
        req.content.text = Some("   ".into());
        let errors = validate_send_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "content"));
    }

    #[test]
    fn attachment_needs_url_or_data() {
        let mut req = request_with_text("hi");
        req.content.attachments.push(Attachment::default());
        let errors = validate_send_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "content.attachments[0]"));
    }

    #[test]
    fn relative_attachment_url_rejected() {
        let mut req = request_with_text("hi");
        req.content.attachments.push(Attachment {
            url: Some("/etc/passwd".into()),
            ..Default::default()
        });
        let errors = validate_send_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "content.attachments[0].url"));
    }

    #[test]
    fn scheduled_must_be_future() {
        let mut req = request_with_text("hi");
        req.options = Some(SendOptions {
            scheduled: Some(Utc::now() - Duration::minutes(5)),
            ..Default::default()
        });
        let errors = validate_send_request(&req).unwrap_err();
        assert!(errors.iter().any(|e| e.path == "options.scheduled"));

        req.options = Some(SendOptions {
            scheduled: Some(Utc::now() + Duration::minutes(5)),
            ..Default::default()
        });
        assert!(validate_send_request(&req).is_ok());
    }
}
