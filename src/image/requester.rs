//! Cinematic transformation with a single rate-limit retry.

use crate::error::{CinefyError, Result};
use crate::image::provider::{GenerateContentRequest, GenerativeBackend};
use crate::image::providers::{GeminiBackend, GeminiModel};
use crate::image::types::{ImagePayload, TransformRequest, TransformResult};
use std::time::Duration;

/// First attempt plus at most one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Wait used when a rate-limit error carries no `RetryInfo`.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Builder for TransformRequester.
#[derive(Debug, Clone)]
pub struct TransformRequesterBuilder<B> {
    backend: B,
    model: String,
    default_retry_delay: Duration,
}

impl<B: GenerativeBackend> TransformRequesterBuilder<B> {
    /// Creates a builder around `backend` with default settings.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            model: GeminiModel::default().as_str().to_string(),
            default_retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the model identifier, e.g. `gemini-2.5-flash-image`.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the wait used when the rate-limit error has no retry hint.
    pub fn default_retry_delay(mut self, delay: Duration) -> Self {
        self.default_retry_delay = delay;
        self
    }

    /// Builds the requester.
    pub fn build(self) -> TransformRequester<B> {
        TransformRequester {
            backend: self.backend,
            model: self.model,
            default_retry_delay: self.default_retry_delay,
        }
    }
}

/// Sends an image to the model and returns the cinematic version.
///
/// A rate-limited first attempt is retried exactly once after the delay the
/// model suggests (or [`DEFAULT_RETRY_DELAY`]). Every other failure, and a
/// second rate limit, is returned unchanged.
#[derive(Debug)]
pub struct TransformRequester<B> {
    backend: B,
    model: String,
    default_retry_delay: Duration,
}

impl TransformRequester<GeminiBackend> {
    /// Creates a requester over Gemini using the API key from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GeminiBackend::builder().build()?))
    }
}

impl<B: GenerativeBackend> TransformRequester<B> {
    /// Creates a requester with default settings.
    pub fn new(backend: B) -> Self {
        TransformRequesterBuilder::new(backend).build()
    }

    /// Creates a new `TransformRequesterBuilder`.
    pub fn builder(backend: B) -> TransformRequesterBuilder<B> {
        TransformRequesterBuilder::new(backend)
    }

    /// Returns the model identifier requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Transforms `image` into a cinematic still.
    ///
    /// Returns `Ok(None)` when the model answered without an image.
    pub async fn transform(&self, image: ImagePayload) -> TransformResult {
        let request = TransformRequest::new(image);
        let body = GenerateContentRequest::from_transform_request(&request);
        tracing::debug!(
            model = %self.model,
            mime_type = request.image().mime_type(),
            size_bytes = request.image().size(),
            "submitting transform request"
        );

        let mut last_error = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self.backend.generate_content(&self.model, &body).await {
                Ok(response) => return response.into_image(),
                Err(e) if e.is_rate_limited() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = e.retry_after().unwrap_or(self.default_retry_delay);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, retrying once: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| CinefyError::Unknown("transform ended without a result".into())))
    }

    /// Checks that the backend is reachable for the configured model.
    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check(&self.model).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{retry_delay_from_details, ErrorDetail};
    use crate::image::provider::{GenerateContentResponse, Part};
    use crate::image::types::CINEMATIC_INSTRUCTION;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted results and records each call.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<GenerateContentResponse>>>,
        calls: Mutex<Vec<(String, GenerateContentRequest)>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<GenerateContentResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        async fn generate_content(
            &self,
            model: &str,
            request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), request.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("backend called more often than scripted")
        }

        async fn health_check(&self, _model: &str) -> Result<()> {
            Ok(())
        }
    }

    fn image_response(b64: &str) -> Result<GenerateContentResponse> {
        Ok(GenerateContentResponse::from_parts(vec![Part::inline(
            "image/png",
            b64,
        )]))
    }

    fn rate_limited(retry_after: Option<Duration>) -> Result<GenerateContentResponse> {
        Err(CinefyError::RateLimited {
            retry_after,
            message: "quota exceeded".into(),
        })
    }

    fn png_input() -> ImagePayload {
        ImagePayload::from_base64("iVBORw0KGgoAAAANSUhEUg==").unwrap()
    }

    #[tokio::test]
    async fn test_transform_returns_inline_image() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![image_response("WFla")]));

        let input = png_input();
        assert_eq!(input.mime_type(), "image/png");

        let output = requester.transform(input).await.unwrap().unwrap();
        assert_eq!(output.data(), b"XYZ");
        assert_eq!(requester.backend().call_count(), 1);
    }

    #[tokio::test]
    async fn test_transform_sends_image_and_instruction() {
        let requester = TransformRequester::builder(ScriptedBackend::new(vec![image_response(
            "WFla",
        )]))
        .model("gemini-2.5-flash-image")
        .build();

        requester.transform(png_input()).await.unwrap();

        let calls = requester.backend().calls.lock().unwrap();
        let (model, body) = &calls[0];
        assert_eq!(model, "gemini-2.5-flash-image");
        let parts = &body.contents[0].parts;
        assert_eq!(parts[0].inline_data.as_ref().unwrap().mime_type, "image/png");
        assert_eq!(parts[1].text.as_deref(), Some(CINEMATIC_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_transform_absent_when_no_image() {
        let response = GenerateContentResponse::from_parts(vec![Part::text("Sorry")]);
        let requester = TransformRequester::new(ScriptedBackend::new(vec![Ok(response)]));

        let output = requester.transform(png_input()).await.unwrap();
        assert!(output.is_none());
        assert_eq!(requester.backend().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_retry_info() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![
            rate_limited(Some(Duration::from_secs(56))),
            image_response("WFla"),
        ]));

        let start = Instant::now();
        let output = requester.transform(png_input()).await.unwrap().unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(56_000));
        assert_eq!(output.data(), b"XYZ");
        assert_eq!(requester.backend().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sub_second_retry_info_still_waits() {
        let hint = retry_delay_from_details(&[ErrorDetail {
            type_url: Some("type.googleapis.com/google.rpc.RetryInfo".into()),
            retry_delay: Some("0.5s".into()),
        }]);
        let requester = TransformRequester::new(ScriptedBackend::new(vec![
            rate_limited(hint),
            image_response("WFla"),
        ]));

        let start = Instant::now();
        requester.transform(png_input()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(requester.backend().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_defaults_to_sixty_seconds() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![
            rate_limited(None),
            image_response("WFla"),
        ]));

        let start = Instant::now();
        requester.transform(png_input()).await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(60_000));
        assert_eq!(requester.backend().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_only_once() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![
            rate_limited(Some(Duration::from_secs(1))),
            rate_limited(Some(Duration::from_secs(2))),
        ]));

        let start = Instant::now();
        let err = requester.transform(png_input()).await.unwrap_err();

        match err {
            CinefyError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(requester.backend().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_propagate_without_retry() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![Err(
            CinefyError::Api {
                status: 500,
                message: "Internal".into(),
            },
        )]));

        let start = Instant::now();
        let err = requester.transform(png_input()).await.unwrap_err();

        assert!(matches!(err, CinefyError::Api { status: 500, .. }));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(requester.backend().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_error_after_retry_propagates() {
        let requester = TransformRequester::new(ScriptedBackend::new(vec![
            rate_limited(Some(Duration::from_secs(3))),
            Err(CinefyError::Auth("revoked".into())),
        ]));

        let err = requester.transform(png_input()).await.unwrap_err();
        assert!(matches!(err, CinefyError::Auth(_)));
        assert_eq!(requester.backend().call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_default_retry_delay() {
        let requester = TransformRequester::builder(ScriptedBackend::new(vec![
            rate_limited(None),
            image_response("WFla"),
        ]))
        .default_retry_delay(Duration::from_secs(5))
        .build();

        let start = Instant::now();
        requester.transform(png_input()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
