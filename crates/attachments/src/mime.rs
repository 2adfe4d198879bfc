//! MIME inference and attachment classing for adapter routing.

/// Extension → MIME table. Anything unknown falls back to
/// `application/octet-stream`.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("zip", "application/zip"),
    ("rar", "application/x-rar-compressed"),
    ("7z", "application/x-7z-compressed"),
];

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Broad attachment class used to pick the provider send path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentClass {
    Image,
    Video,
    Audio,
    Document,
}

impl AttachmentClass {
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }
}

/// Infer a MIME type by priority: caller-provided valid MIME, then a
/// data-URI MIME, then the extension table, then octet-stream.
#[must_use]
pub fn infer_mime(
    explicit: Option<&str>,
    data_uri_mime: Option<&str>,
    filename: Option<&str>,
) -> String {
    if let Some(mime) = explicit.filter(|m| is_plausible_mime(m)) {
        return mime.to_string();
    }
    if let Some(mime) = data_uri_mime.filter(|m| is_plausible_mime(m)) {
        return mime.to_string();
    }
    if let Some(mime) = filename.and_then(lookup_extension) {
        return mime.to_string();
    }
    OCTET_STREAM.to_string()
}

fn lookup_extension(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    EXTENSION_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

fn is_plausible_mime(mime: &str) -> bool {
    mime.split_once('/')
        .is_some_and(|(kind, sub)| !kind.is_empty() && !sub.is_empty())
}
