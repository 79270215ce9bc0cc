#![warn(missing_docs)]
//! Cinefy - turn photos into cinematic stills with Gemini image models.
//!
//! The crate wraps a single remote call: the photo and a fixed
//! cinematography instruction go out, a restyled image (or nothing) comes
//! back. A rate-limited call is retried once after the delay the API asks for.
//!
//! # Quick Start
//!
//! ```no_run
//! use cinefy::{ImagePayload, TransformRequester, NO_IMAGE_MESSAGE};
//!
//! #[tokio::main]
//! async fn main() -> cinefy::Result<()> {
//!     // Reads GOOGLE_API_KEY (or API_KEY) from the environment.
//!     let requester = TransformRequester::from_env()?;
//!     let photo = ImagePayload::read("portrait.jpg").await?;
//!
//!     match requester.transform(photo).await? {
//!         Some(still) => still.save("portrait_cinematic.png").await?,
//!         None => eprintln!("{NO_IMAGE_MESSAGE}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom backends
//!
//! [`TransformRequester`] is generic over [`GenerativeBackend`], so any
//! implementation of `generateContent` can stand in for the HTTP client.
//!
//! # Features
//!
//! - `cli`: the `cinefy` command-line tool

mod error;

pub mod image;

// Re-export error types at crate root
pub use error::{CinefyError, ErrorDetail, Result};

pub use image::providers::{GeminiBackend, GeminiBackendBuilder, GeminiModel};
pub use image::{
    GenerativeBackend, ImageFormat, ImagePayload, TransformRequest, TransformRequester,
    TransformRequesterBuilder, TransformResult, CINEMATIC_INSTRUCTION, DEFAULT_RETRY_DELAY,
    NO_IMAGE_MESSAGE,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{CinefyError, Result};
    pub use crate::image::providers::GeminiBackend;
    pub use crate::image::{GenerativeBackend, ImagePayload, TransformRequester};
}
