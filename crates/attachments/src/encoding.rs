//! Base64 attachment payload validation and decoding.

use base64::{
    Engine,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

use crate::error::{AttachmentError, Result};

/// Default decoded-size cap: 25 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;

/// Validation accepts both padded and unpadded bodies, so decoding must
/// too; the canonical-padding engine would reject inputs that already
/// passed [`Base64Payload::parse`].
const PADDING_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A validated base64 payload, with the data-URI MIME (when present)
/// split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Payload {
    /// MIME declared in a `data:<mime>;base64,` prefix.
    pub mime: Option<String>,
    body: String,
}

impl Base64Payload {
    /// Validate a raw payload against the size cap, stripping an optional
    /// data-URI prefix.
    pub fn parse(raw: &str, max_bytes: usize) -> Result<Self> {
        let (mime, body) = match strip_data_uri(raw) {
            Some((mime, body)) => (mime, body),
            None => (None, raw),
        };

        if !is_base64_body(body) {
            return Err(AttachmentError::InvalidBase64(
                "body contains characters outside the base64 alphabet".into(),
            ));
        }

        let decoded_size = body.len() * 3 / 4;
        if decoded_size > max_bytes {
            return Err(AttachmentError::TooLarge {
                size: decoded_size,
                limit: max_bytes,
            });
        }

        Ok(Self {
            mime,
            body: body.to_string(),
        })
    }

    /// Estimated decoded size in bytes.
    #[must_use]
    pub fn decoded_size(&self) -> usize {
        self.body.len() * 3 / 4
    }

    /// Decode the payload into bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        PADDING_INDIFFERENT
            .decode(&self.body)
            .map_err(|e| AttachmentError::InvalidBase64(e.to_string()))
    }
}

/// Split `data:<mime>;base64,<body>` into its parts; `None` when `raw` is
/// not a data URI.
fn strip_data_uri(raw: &str) -> Option<(Option<String>, &str)> {
    let rest = raw.strip_prefix("data:")?;
    let (header, body) = rest.split_once(',')?;
    let mime = header
        .strip_suffix(";base64")
        .unwrap_or(header)
        .trim()
        .to_string();
    let mime = if mime.is_empty() { None } else { Some(mime) };
    Some((mime, body))
}

/// Standard alphabet, optionally padded with up to two trailing `=`.
fn is_base64_body(body: &str) -> bool {
    let trimmed = body.trim_end_matches('=');
    if body.len() - trimmed.len() > 2 {
        return false;
    }
    trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_base64_accepted() {
        let payload = Base64Payload::parse("aGVsbG8=", MAX_ATTACHMENT_BYTES).unwrap();
        assert_eq!(payload.mime, None);
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[test]
    fn unpadded_base64_decodes() {
        // Everything the validation regex accepts must also decode.
        let payload = Base64Payload::parse("aGVsbG8", MAX_ATTACHMENT_BYTES).unwrap();
        assert_eq!(payload.decode().unwrap(), b"hello");

        let data_uri =
            Base64Payload::parse("data:image/png;base64,aGVsbG8", MAX_ATTACHMENT_BYTES).unwrap();
        assert_eq!(data_uri.decode().unwrap(), b"hello");
    }

    #[test]
    fn data_uri_prefix_stripped() {
        let payload =
            Base64Payload::parse("data:image/png;base64,aGVsbG8=", MAX_ATTACHMENT_BYTES).unwrap();
        assert_eq!(payload.mime.as_deref(), Some("image/png"));
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[test]
    fn invalid_alphabet_rejected() {
        assert!(matches!(
            Base64Payload::parse("abc$def", MAX_ATTACHMENT_BYTES),
            Err(AttachmentError::InvalidBase64(_))
        ));
        // padding in the middle
        assert!(matches!(
            Base64Payload::parse("ab=cd", MAX_ATTACHMENT_BYTES),
            Err(AttachmentError::InvalidBase64(_))
        ));
        assert!(matches!(
            Base64Payload::parse("abcd====", MAX_ATTACHMENT_BYTES),
            Err(AttachmentError::InvalidBase64(_))
        ));
    }

    #[test]
    fn size_boundary_is_exact() {
        // A body of n chars decodes to n*3/4 bytes; build a payload at the
        // cap and one character-quad past it.
        let at_limit_chars = MAX_ATTACHMENT_BYTES * 4 / 3;
        let body = "A".repeat(at_limit_chars);
        assert!(Base64Payload::parse(&body, MAX_ATTACHMENT_BYTES).is_ok());

        let over = "A".repeat(at_limit_chars + 4);
        assert!(matches!(
            Base64Payload::parse(&over, MAX_ATTACHMENT_BYTES),
            Err(AttachmentError::TooLarge { .. })
        ));
    }

    #[test]
    fn empty_body_is_valid() {
        let payload = Base64Payload::parse("", MAX_ATTACHMENT_BYTES).unwrap();
        assert_eq!(payload.decoded_size(), 0);
    }
}
