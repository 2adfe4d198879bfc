//! Resolution of attachment inputs into in-memory buffers.

use std::time::Duration;

use tracing::debug;

use gridkit_common::types::Attachment;

use crate::{
    encoding::{Base64Payload, MAX_ATTACHMENT_BYTES},
    error::{AttachmentError, Result},
    mime::{AttachmentClass, infer_mime},
    ssrf,
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// An attachment resolved to bytes, ready for a provider adapter.
#[derive(Debug, Clone)]
pub struct ResolvedAttachment {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
    pub class: AttachmentClass,
    pub caption: Option<String>,
}

/// Downloads and validates attachments. The only component that performs
/// outbound fetches on caller-supplied URLs.
pub struct AttachmentFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    allow_private_hosts: bool,
}

impl Default for AttachmentFetcher {
    fn default() -> Self {
        Self::new(MAX_ATTACHMENT_BYTES)
    }
}

impl AttachmentFetcher {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default(),
            max_bytes,
            allow_private_hosts: false,
        }
    }

    /// Disable the SSRF host checks. Local development against loopback
    /// fixtures only; never in production wiring.
    #[must_use]
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    async fn check_url(&self, raw_url: &str) -> Result<url::Url> {
        if self.allow_private_hosts {
            let url =
                url::Url::parse(raw_url).map_err(|e| AttachmentError::InvalidUrl(e.to_string()))?;
            return match url.scheme() {
                "http" | "https" => Ok(url),
                other => Err(AttachmentError::UnsupportedScheme(other.to_string())),
            };
        }
        ssrf::validate_url(raw_url).await
    }

    /// Validate an attachment input without fetching URL bodies. Used on
    /// the synchronous send path, where a bad URL must reject the request
    /// before a job is enqueued.
    pub async fn validate(&self, attachment: &Attachment) -> Result<()> {
        match (&attachment.url, &attachment.data) {
            (Some(url), _) => {
                self.check_url(url).await?;
                Ok(())
            },
            (None, Some(data)) => {
                Base64Payload::parse(data, self.max_bytes)?;
                Ok(())
            },
            (None, None) => Err(AttachmentError::InvalidUrl(
                "attachment requires url or data".into(),
            )),
        }
    }

    /// Resolve an attachment to bytes: download URL-mode inputs, decode
    /// base64-mode inputs.
    pub async fn resolve(&self, attachment: &Attachment) -> Result<ResolvedAttachment> {
        match (&attachment.url, &attachment.data) {
            (Some(url), _) => self.resolve_url(attachment, url).await,
            (None, Some(data)) => self.resolve_base64(attachment, data),
            (None, None) => Err(AttachmentError::InvalidUrl(
                "attachment requires url or data".into(),
            )),
        }
    }

    async fn resolve_url(&self, attachment: &Attachment, raw_url: &str) -> Result<ResolvedAttachment> {
        let url = self.check_url(raw_url).await?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AttachmentError::Download(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AttachmentError::Download(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttachmentError::Download(e.to_string()))?;
        if bytes.len() > self.max_bytes {
            return Err(AttachmentError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }

        let filename = attachment
            .filename
            .clone()
            .or_else(|| filename_from_url(&url))
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = infer_mime(
            attachment.mime_type.as_deref(),
            header_mime.as_deref(),
            Some(&filename),
        );

        debug!(url = %url, bytes = bytes.len(), mime = %mime_type, "attachment downloaded");

        Ok(ResolvedAttachment {
            class: AttachmentClass::from_mime(&mime_type),
            bytes: bytes.to_vec(),
            filename,
            mime_type,
            caption: attachment.caption.clone(),
        })
    }

    fn resolve_base64(&self, attachment: &Attachment, data: &str) -> Result<ResolvedAttachment> {
        let payload = Base64Payload::parse(data, self.max_bytes)?;
        let bytes = payload.decode()?;

        let filename = attachment
            .filename
            .clone()
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = infer_mime(
            attachment.mime_type.as_deref(),
            payload.mime.as_deref(),
            Some(&filename),
        );

        Ok(ResolvedAttachment {
            class: AttachmentClass::from_mime(&mime_type),
            bytes,
            filename,
            mime_type,
            caption: attachment.caption.clone(),
        })
    }
}

fn filename_from_url(url: &url::Url) -> Option<String> {
    url.path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(String::from)
}
