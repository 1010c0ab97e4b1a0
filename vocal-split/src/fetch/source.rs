//! Submission-time source validation.

use thiserror::Error;
use url::Url;

use crate::Error;

/// Hosts accepted for remote sources.
pub const SUPPORTED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Upload extensions accepted without looking at the declared MIME type.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg"];

/// Rejected source at submission time.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SourceError {
    #[error("URL is empty")]
    EmptyUrl,

    #[error("malformed URL: {0}")]
    Malformed(String),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("unsupported host '{0}'")]
    UnsupportedHost(String),

    #[error("missing file name")]
    MissingFilename,

    #[error("unsupported file type '{0}'")]
    UnsupportedExtension(String),

    #[error("file has no extension and is not declared as audio")]
    NotAudio,
}

impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        Error::InvalidSource(err.to_string())
    }
}

/// Validate a remote URL: http(s) on one of [`SUPPORTED_HOSTS`].
pub fn validate_remote_url(raw: &str) -> Result<Url, SourceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SourceError::EmptyUrl);
    }

    let url = Url::parse(trimmed).map_err(|e| SourceError::Malformed(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SourceError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| SourceError::Malformed("missing host".to_string()))?;
    if !SUPPORTED_HOSTS.contains(&host.as_str()) {
        return Err(SourceError::UnsupportedHost(host));
    }

    Ok(url)
}

/// Validate an uploaded file by name and declared MIME type.
///
/// Returns the extension the stored file should use.
pub fn validate_upload(filename: &str, content_type: Option<&str>) -> Result<String, SourceError> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(SourceError::MissingFilename);
    }

    let extension = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        Some(ext) => Err(SourceError::UnsupportedExtension(ext)),
        None => {
            let is_audio = content_type
                .map(|ct| ct.trim().to_ascii_lowercase().starts_with("audio/"))
                .unwrap_or(false);
            if is_audio {
                Ok(extension_for_mime(content_type.unwrap_or_default()).to_string())
            } else {
                Err(SourceError::NotAudio)
            }
        }
    }
}

fn extension_for_mime(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        _ => "mp3",
    }
}

/// Keep only the final path component of a client-supplied file name.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
