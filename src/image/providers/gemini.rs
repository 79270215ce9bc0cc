//! Gemini (Google) generative backend.

use crate::error::{
    is_rate_limit_status, retry_delay_from_details, sanitize_error_message, CinefyError,
    ErrorDetail, Result,
};
use crate::image::provider::{GenerateContentRequest, GenerateContentResponse, GenerativeBackend};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "API_KEY"];

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.5 Flash Image preview.
    #[default]
    FlashImagePreview,
    /// Gemini 2.5 Flash Image (stable).
    FlashImage,
    /// Gemini 3 Pro Image (highest quality).
    ProImagePreview,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashImagePreview => "gemini-2.5-flash-image-preview",
            Self::FlashImage => "gemini-2.5-flash-image",
            Self::ProImagePreview => "gemini-3-pro-image-preview",
        }
    }
}

impl std::fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for GeminiBackend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl Default for GeminiBackendBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl GeminiBackendBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, then `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL (useful for proxies and tests).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the backend, resolving the API key.
    pub fn build(self) -> Result<GeminiBackend> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|k| !k.trim().is_empty()))
            })
            .ok_or_else(|| {
                CinefyError::MissingCredential(format!(
                    "{} not set and no API key provided",
                    API_KEY_ENV_VARS.join(" / ")
                ))
            })?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(GeminiBackend {
            client,
            api_key,
            base_url: self.base_url,
        })
    }
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Creates a new `GeminiBackendBuilder`.
    pub fn builder() -> GeminiBackendBuilder {
        GeminiBackendBuilder::new()
    }

    fn parse_error(&self, status: u16, text: &str) -> CinefyError {
        let body = ApiErrorBody::parse(text);
        let message = body
            .as_ref()
            .and_then(|b| b.message.as_deref())
            .map(sanitize_error_message)
            .unwrap_or_else(|| sanitize_error_message(text));

        let (code, symbolic) = match &body {
            Some(b) => (b.code.or(Some(status)), b.status.as_deref()),
            None => (Some(status), None),
        };

        if is_rate_limit_status(Some(status), symbolic) || is_rate_limit_status(code, None) {
            let retry_after = body
                .as_ref()
                .and_then(|b| retry_delay_from_details(&b.details));
            return CinefyError::RateLimited {
                retry_after,
                message,
            };
        }
        if status == 401 || status == 403 {
            return CinefyError::Auth(message);
        }
        CinefyError::Api { status, message }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let start = Instant::now();
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), model, "gemini request failed");
            return Err(self.parse_error(status.as_u16(), &text));
        }

        let body: GenerateContentResponse = response.json().await?;
        tracing::debug!(
            model,
            duration_ms = start.elapsed().as_millis() as u64,
            candidates = body.candidates.len(),
            "gemini request completed"
        );
        Ok(body)
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self, model: &str) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, model);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(CinefyError::Auth("Invalid API key".into())),
            404 => Err(CinefyError::Api {
                status: 404,
                message: format!("Model {model} not found"),
            }),
            s if !(200..300).contains(&s) => Err(CinefyError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// `{"error": {...}}`, sometimes wrapped in a one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorEnvelope {
    Single { error: ApiErrorBody },
    List(Vec<ApiErrorEnvelope>),
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

impl ApiErrorBody {
    fn parse(text: &str) -> Option<Self> {
        let mut envelope: ApiErrorEnvelope = serde_json::from_str(text).ok()?;
        loop {
            match envelope {
                ApiErrorEnvelope::Single { error } => return Some(error),
                ApiErrorEnvelope::List(list) => envelope = list.into_iter().next()?,
            }
        }
    }
}
