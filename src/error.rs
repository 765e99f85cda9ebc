//! Error types for enhancement and compositing.

use std::time::Duration;

/// Errors that can occur while enhancing or compositing a product photo.
#[derive(Debug, thiserror::Error)]
pub enum BackdropError {
    /// The model refused the request or stopped for a non-normal reason.
    #[error("request blocked: {0}")]
    Blocked(String),

    /// The model answered with text and no image.
    #[error("model returned text instead of an image: {0}")]
    TextInsteadOfImage(String),

    /// The response carried no candidates or no usable parts.
    #[error("model returned no image")]
    NoImage,

    /// A drawing surface could not be allocated.
    #[error("drawing surface unavailable: {0}")]
    Canvas(String),

    /// An image could not be decoded.
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body or a fixed explanation.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested wait, from `Retry-After`.
        retry_after: Option<Duration>,
    },

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An enhancement is already in flight.
    #[error("an enhancement is already in progress")]
    Busy,

    /// Network or HTTP error.
    #[cfg(feature = "gemini")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackdropError {
    /// Returns true if this error came from the remote model call.
    pub fn is_remote(&self) -> bool {
        match self {
            Self::Blocked(_)
            | Self::TextInsteadOfImage(_)
            | Self::NoImage
            | Self::Auth(_)
            | Self::Api { .. }
            | Self::RateLimited { .. }
            | Self::Decode(_) => true,
            #[cfg(feature = "gemini")]
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// Returns the single message shown to the user for this failure.
    ///
    /// Remote failures are wrapped into one enhancement message; nothing is
    /// retried, the user resubmits.
    pub fn user_message(&self) -> String {
        match self {
            Self::Busy => "An enhancement is already running. Please wait.".to_string(),
            e if e.is_remote() => format!("Enhancement failed: {e}"),
            Self::Canvas(_) | Self::ImageLoad(_) => format!("Could not compose the image: {self}"),
            e => format!("Something went wrong: {e}"),
        }
    }
}

impl From<image::ImageError> for BackdropError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => Self::Io(e),
            image::ImageError::Limits(e) => Self::Canvas(e.to_string()),
            other => Self::ImageLoad(other.to_string()),
        }
    }
}

/// Result type alias for backdrop operations.
pub type Result<T> = std::result::Result<T, BackdropError>;

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Collapses whitespace and truncates an upstream error body for display.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
    format!("{truncated}...")
}

/// Parses a `Retry-After` header given in seconds.
#[cfg(feature = "gemini")]
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(BackdropError::Blocked("SAFETY".into()).is_remote());
        assert!(BackdropError::TextInsteadOfImage("sorry".into()).is_remote());
        assert!(BackdropError::NoImage.is_remote());
        assert!(BackdropError::RateLimited { retry_after: None }.is_remote());

        assert!(!BackdropError::Canvas("zero width".into()).is_remote());
        assert!(!BackdropError::ImageLoad("bad png".into()).is_remote());
        assert!(!BackdropError::Busy.is_remote());
    }

    #[test]
    fn test_user_message_wraps_remote_failures() {
        let msg = BackdropError::TextInsteadOfImage("I cannot do that".into()).user_message();
        assert_eq!(
            msg,
            "Enhancement failed: model returned text instead of an image: I cannot do that"
        );

        let msg = BackdropError::ImageLoad("truncated".into()).user_message();
        assert!(msg.starts_with("Could not compose the image"));
    }

    #[test]
    fn test_error_display() {
        let err = BackdropError::Api {
            status: 404,
            message: "Not found".into(),
        };
        assert_eq!(err.to_string(), "API error: 404 - Not found");

        let err = BackdropError::Blocked("IMAGE_SAFETY".into());
        assert_eq!(err.to_string(), "request blocked: IMAGE_SAFETY");
    }

    #[test]
    fn test_sanitize_error_message() {
        assert_eq!(sanitize_error_message("  a\n\n b  "), "a b");

        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 10);
        let sanitized = sanitize_error_message(&long);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.len(), MAX_ERROR_MESSAGE_LEN + 3);
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn test_parse_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));
    }
}
