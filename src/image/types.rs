//! Core types for cinematic transformation.

use crate::error::{CinefyError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Instruction sent alongside every image.
pub const CINEMATIC_INSTRUCTION: &str = "You are an expert cinematographer and colorist. \
Your task is to transform the provided image into a high-quality, movie-level cinematic shot. \
Focus on applying dramatic, professional lighting, a sophisticated cinematic color grade, \
and enhancing the overall mood and atmosphere to make it look like a still from a blockbuster film. \
Crucially, you must preserve the identity, features, and pose of any person in the photo, \
and maintain the core structure of any location. The transformation should be purely stylistic.";

/// Message shown to users when the model answers without an image.
pub const NO_IMAGE_MESSAGE: &str = "The AI model did not return an image. Please try again.";

/// Number of base64 characters inspected when sniffing a signature.
const BASE64_SIGNATURE_LEN: usize = 20;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Maps a MIME type reported by the model back to a format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from raw magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }

    /// Detects image format from the first characters of a base64 string.
    ///
    /// These are the base64 renderings of the magic bytes above, so a payload
    /// can be classified before it is decoded.
    pub fn from_base64_signature(encoded: &str) -> Option<Self> {
        let signature: String = encoded.chars().take(BASE64_SIGNATURE_LEN).collect();
        if signature.contains("iVBORw0KGgo") {
            Some(Self::Png)
        } else if signature.contains("/9j/") {
            Some(Self::Jpeg)
        } else if signature.contains("UklGR") {
            Some(Self::WebP)
        } else {
            None
        }
    }

    /// Best-effort detection from raw bytes. Falls back to PNG.
    pub fn infer(data: &[u8]) -> Self {
        Self::from_magic_bytes(data).unwrap_or_default()
    }
}

/// Binary image data plus its media subtype.
///
/// Immutable once built; consumed by a single transform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: Vec<u8>,
    format: ImageFormat,
}

impl ImagePayload {
    /// Wraps raw bytes, inferring the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let format = ImageFormat::infer(&data);
        Self { data, format }
    }

    /// Wraps raw bytes with an explicitly known format.
    pub fn with_format(data: Vec<u8>, format: ImageFormat) -> Self {
        Self { data, format }
    }

    /// Decodes a base64 payload, inferring the format from its signature.
    ///
    /// Accepts a `data:<mime>;base64,` prefix, embedded whitespace and
    /// missing padding.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let b64 = strip_data_url_prefix(encoded);
        let format = ImageFormat::from_base64_signature(b64).unwrap_or_default();
        let data = decode_base64_lenient(b64)?;
        Ok(Self { data, format })
    }

    /// Reads an image from disk.
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(data))
    }

    /// Returns the raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the payload, returning the raw bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the image format.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Returns the MIME type sent to the model.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }

    /// Saves the image to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// Outcome of a transform: an image, `None` when the model returned no
/// image, or an error.
pub type TransformResult = Result<Option<ImagePayload>>;

/// A single transformation request: one image and the fixed instruction.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    image: ImagePayload,
}

impl TransformRequest {
    /// Creates a request carrying [`CINEMATIC_INSTRUCTION`].
    pub fn new(image: ImagePayload) -> Self {
        Self { image }
    }

    /// Returns the image to transform.
    pub fn image(&self) -> &ImagePayload {
        &self.image
    }

    /// Returns the style directive sent with the image.
    pub fn instruction(&self) -> &'static str {
        CINEMATIC_INSTRUCTION
    }
}

fn strip_data_url_prefix(input: &str) -> &str {
    match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    }
}

/// Decodes base64 that may be missing padding or contain whitespace.
pub(crate) fn decode_base64_lenient(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .map_err(|e| CinefyError::Decode(e.to_string()))
}
