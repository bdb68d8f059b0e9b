use reqwest::Client;
use thiserror::Error;

use crate::error::{GatewayError, Result};

/// Largest accepted image: 5 MiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// MIME types the generation workflow accepts.
pub const ACCEPTED_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/jpg", "image/webp"];

/// An image submitted for prompt generation. Lives for one request only.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub file_name: String,
}

impl UploadCandidate {
    /// Create a candidate from in-memory bytes. The size is taken from the
    /// buffer; the MIME type is whatever the uploader declared.
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        let size_bytes = bytes.len() as u64;
        Self {
            bytes,
            mime_type: mime_type.into(),
            size_bytes,
            file_name: file_name.into(),
        }
    }

    /// Fetch a candidate from a URL. The file name is derived from the URL
    /// path and the MIME type from the response `Content-Type`.
    pub async fn from_url(client: &Client, url: &str) -> Result<Self> {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Network {
                context: format!("Failed to fetch image from {}", url),
                source: e,
            })?;

        if !resp.status().is_success() {
            return Err(GatewayError::Remote {
                status: resp.status().as_u16(),
                details: format!("Failed to fetch image: {}", resp.status()),
            });
        }

        let mime_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let file_name = file_name_from_url(url);

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Network {
                context: "Failed to read image bytes".into(),
                source: e,
            })?
            .to_vec();

        Ok(Self::new(bytes, mime_type, file_name))
    }
}

/// Why a candidate was rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The declared MIME type is not an accepted image format.
    #[error("unsupported image type: {0} (expected PNG, JPG, or WEBP)")]
    InvalidType(String),

    /// The image exceeds the size limit.
    #[error("image is {0} bytes, larger than the {MAX_FILE_SIZE}-byte limit")]
    TooLarge(u64),
}

/// Check a candidate against the size and type constraints.
///
/// Size is checked first so an oversized file reports `TooLarge` no matter
/// what its declared type is. Pure and synchronous.
pub fn validate_file(candidate: &UploadCandidate) -> std::result::Result<(), ValidationError> {
    if candidate.size_bytes > MAX_FILE_SIZE {
        return Err(ValidationError::TooLarge(candidate.size_bytes));
    }

    if !ACCEPTED_TYPES.contains(&candidate.mime_type.as_str()) {
        return Err(ValidationError::InvalidType(candidate.mime_type.clone()));
    }

    Ok(())
}

fn file_name_from_url(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image.jpg".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(size: usize, mime: &str) -> UploadCandidate {
        UploadCandidate::new(vec![0u8; size], mime, "photo.png")
    }

    #[test]
    fn accepts_valid_png() {
        assert!(validate_file(&candidate(1024, "image/png")).is_ok());
    }

    #[test]
    fn accepts_every_listed_type() {
        for mime in ACCEPTED_TYPES {
            assert!(validate_file(&candidate(1024, mime)).is_ok());
        }
    }

    #[test]
    fn rejects_oversized_file() {
        let result = validate_file(&candidate(MAX_FILE_SIZE as usize + 1, "image/png"));
        assert_eq!(
            result,
            Err(ValidationError::TooLarge(MAX_FILE_SIZE + 1))
        );
    }

    #[test]
    fn oversized_wins_over_bad_type() {
        // Size is reported even when the type is also wrong.
        let result = validate_file(&candidate(MAX_FILE_SIZE as usize + 1, "application/pdf"));
        assert!(matches!(result, Err(ValidationError::TooLarge(_))));
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        assert!(validate_file(&candidate(MAX_FILE_SIZE as usize, "image/webp")).is_ok());
    }

    #[test]
    fn rejects_unknown_mime_type() {
        let result = validate_file(&candidate(1024, "image/gif"));
        assert_eq!(
            result,
            Err(ValidationError::InvalidType("image/gif".to_string()))
        );
    }

    #[test]
    fn candidate_size_tracks_buffer() {
        let c = UploadCandidate::new(vec![1, 2, 3], "image/png", "a.png");
        assert_eq!(c.size_bytes, 3);
    }

    #[test]
    fn file_name_from_url_takes_last_segment() {
        assert_eq!(
            file_name_from_url("https://example.com/photos/cat.webp"),
            "cat.webp"
        );
        assert_eq!(
            file_name_from_url("https://example.com/photos/cat.webp?size=large"),
            "cat.webp"
        );
    }

    #[test]
    fn file_name_from_url_falls_back() {
        assert_eq!(file_name_from_url("https://example.com/"), "image.jpg");
        assert_eq!(file_name_from_url("not a url"), "image.jpg");
    }
}
