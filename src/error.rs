//! Error types for cinematic transformation.

use serde::Deserialize;
use std::time::Duration;

/// Longest error message kept from a remote response body.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while transforming an image.
#[derive(Debug, thiserror::Error)]
pub enum CinefyError {
    /// No API key was configured. Fatal at startup.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// API key was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limit exceeded (HTTP 429 / `RESOURCE_EXHAUSTED`).
    #[error("rate limited, retry after {retry_after:?}: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Any other error reported by the remote model.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., reading the input or saving the result).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every attempt ended without a recorded error.
    #[error("unknown failure: {0}")]
    Unknown(String),
}

impl CinefyError {
    /// Returns true if the remote model asked us to back off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns the wait suggested by the remote model, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for transformation operations.
pub type Result<T> = std::result::Result<T, CinefyError>;

/// One entry of the `details` list attached to a Google API error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Type URL, e.g. `type.googleapis.com/google.rpc.RetryInfo`.
    #[serde(rename = "@type", default)]
    pub type_url: Option<String>,
    /// Suggested delay, e.g. `"56s"`. Only present on `RetryInfo` entries.
    #[serde(default)]
    pub retry_delay: Option<String>,
}

impl ErrorDetail {
    fn is_retry_info(&self) -> bool {
        self.type_url
            .as_deref()
            .is_some_and(|t| t.contains("RetryInfo"))
    }
}

/// Returns true for the status markers Google uses for rate limiting.
pub(crate) fn is_rate_limit_status(code: Option<u16>, status: Option<&str>) -> bool {
    code == Some(429) || status == Some("RESOURCE_EXHAUSTED")
}

/// Extracts the retry delay from a `RetryInfo` detail entry.
///
/// The delay must look like `"<integer>s"` or `"<integer>.<fraction>s"`; a
/// fraction rounds up to the next whole second. When several entries match, the last one wins.
pub(crate) fn retry_delay_from_details(details: &[ErrorDetail]) -> Option<Duration> {
    details
        .iter()
        .filter(|d| d.is_retry_info())
        .filter_map(|d| d.retry_delay.as_deref())
        .filter_map(parse_delay_seconds)
        .last()
}

fn parse_delay_seconds(value: &str) -> Option<Duration> {
    let secs = value.trim().strip_suffix('s')?;
    let (whole, fraction) = secs.split_once('.').unwrap_or((secs, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return None;
    }
    if secs.contains('.') && fraction.is_empty() {
        return None;
    }

    let mut whole = whole.parse::<u64>().ok()?;
    if fraction.bytes().any(|b| b != b'0') {
        whole = whole.checked_add(1)?;
    }
    Some(Duration::from_secs(whole))
}

/// Trims a remote error message to a bounded length on a char boundary.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_ERROR_MESSAGE_LEN {
        return text.to_string();
    }
    let mut end = MAX_ERROR_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
