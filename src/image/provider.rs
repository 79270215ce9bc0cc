//! Backend trait for the remote generative model and its wire types.

use crate::error::Result;
use crate::image::types::{decode_base64_lenient, ImageFormat, ImagePayload, TransformRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A remote capability that turns contents into generated contents.
///
/// Implemented over HTTP by [`GeminiBackend`](crate::image::providers::GeminiBackend);
/// tests drive the requester with in-memory implementations.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Submits a single `generateContent` call for `model`.
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Returns the name of this backend for display.
    fn name(&self) -> &str {
        "generative backend"
    }

    /// Checks if the backend is reachable and authenticated for `model`.
    async fn health_check(&self, model: &str) -> Result<()>;
}

#[async_trait]
impl<T: GenerativeBackend + ?Sized> GenerativeBackend for Arc<T> {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        (**self).generate_content(model, request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    async fn health_check(&self, model: &str) -> Result<()> {
        (**self).health_check(model).await
    }
}

/// Body of a `generateContent` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns; always a single turn here.
    pub contents: Vec<Content>,
    /// Output options.
    pub generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// Builds the single-turn request: the image first, then the instruction.
    pub fn from_transform_request(request: &TransformRequest) -> Self {
        let parts = vec![
            Part::inline(request.image().mime_type(), request.image().to_base64()),
            Part::text(request.instruction()),
        ];

        Self {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

/// An ordered list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    /// Parts in order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A part carries text, inline binary data, or nothing we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline binary content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    /// A text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    /// An inline-data part with base64 `data`.
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

/// Base64 inline data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type of the data, e.g. `image/png`.
    #[serde(default)]
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

/// Requested output modalities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// e.g. `["IMAGE", "TEXT"]`.
    pub response_modalities: Vec<String>,
}

/// Response of a `generateContent` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate results; only the first is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Set when the prompt itself was blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<PromptFeedback>,
}

/// One generated candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// e.g. `STOP`, `IMAGE_SAFETY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Feedback about the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    /// Why the prompt was blocked, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// A response whose first candidate holds exactly `parts`.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content { parts }),
                finish_reason: Some("STOP".to_string()),
            }],
            prompt_feedback: None,
        }
    }

    /// Returns the first inline image of the first candidate.
    ///
    /// `Ok(None)` means the model answered without an image; text parts are
    /// ignored.
    pub fn into_image(self) -> Result<Option<ImagePayload>> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);

        let Some(candidate) = self.candidates.into_iter().next() else {
            tracing::warn!(block_reason = ?block_reason, "model returned no candidates");
            return Ok(None);
        };

        let finish_reason = candidate.finish_reason;
        let blob = candidate
            .content
            .into_iter()
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data);

        let Some(blob) = blob else {
            tracing::warn!(
                finish_reason = ?finish_reason,
                block_reason = ?block_reason,
                "model returned no image data"
            );
            return Ok(None);
        };

        let data = decode_base64_lenient(&blob.data)?;
        let format = ImageFormat::from_mime_type(&blob.mime_type)
            .unwrap_or_else(|| ImageFormat::infer(&data));

        Ok(Some(ImagePayload::with_format(data, format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CinefyError;
    use crate::image::types::CINEMATIC_INSTRUCTION;

    #[test]
    fn test_request_construction() {
        let image = ImagePayload::from_base64("iVBORw0KGgo=").unwrap();
        let request = TransformRequest::new(image);
        let body = GenerateContentRequest::from_transform_request(&request);

        assert_eq!(body.contents.len(), 1);
        let parts = &body.contents[0].parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Part::inline("image/png", "iVBORw0KGgo="));
        assert_eq!(parts[1], Part::text(CINEMATIC_INSTRUCTION));
        assert_eq!(
            body.generation_config.response_modalities,
            vec!["IMAGE", "TEXT"]
        );
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let image = ImagePayload::from_bytes(b"XYZ".to_vec());
        let body = GenerateContentRequest::from_transform_request(&TransformRequest::new(image));
        let json = serde_json::to_value(&body).unwrap();

        assert!(json.get("generationConfig").is_some());
        assert!(json.get("generation_config").is_none());
        assert_eq!(
            json["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["data"], "WFla");
        assert!(json["contents"][0]["parts"][0].get("text").is_none());
    }

    #[test]
    fn test_into_image_returns_first_inline_part() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your shot"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "WFla"}},
                        {"inlineData": {"mimeType": "image/png", "data": "QUJD"}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let image = resp.into_image().unwrap().unwrap();
        assert_eq!(image.data(), b"XYZ");
        assert_eq!(image.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_into_image_infers_format_when_mime_unknown() {
        let resp = GenerateContentResponse::from_parts(vec![Part::inline(
            "application/octet-stream",
            "/9j/4A==",
        )]);
        let image = resp.into_image().unwrap().unwrap();
        assert_eq!(image.format(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_into_image_absent_when_only_text() {
        let resp = GenerateContentResponse::from_parts(vec![Part::text("I cannot do that")]);
        assert!(resp.into_image().unwrap().is_none());
    }

    #[test]
    fn test_into_image_absent_without_candidates() {
        let json = r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_image().unwrap().is_none());
    }

    #[test]
    fn test_into_image_absent_without_content() {
        let json = r#"{"candidates": [{"finishReason": "IMAGE_SAFETY"}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_image().unwrap().is_none());
    }

    #[test]
    fn test_into_image_rejects_bad_base64() {
        let resp = GenerateContentResponse::from_parts(vec![Part::inline("image/png", "!!")]);
        assert!(matches!(resp.into_image(), Err(CinefyError::Decode(_))));
    }

    #[test]
    fn test_unknown_part_fields_are_ignored() {
        let json = r#"{"candidates": [{"content": {"parts": [{"thoughtSignature": "abc"}], "role": "model"}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_image().unwrap().is_none());
    }
}
