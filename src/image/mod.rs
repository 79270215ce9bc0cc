//! Image transformation module.

mod provider;
pub mod providers;
mod requester;
mod types;

pub use provider::{
    Blob, Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    GenerativeBackend, Part, PromptFeedback,
};
pub use requester::{TransformRequester, TransformRequesterBuilder, DEFAULT_RETRY_DELAY};
pub use types::{
    ImageFormat, ImagePayload, TransformRequest, TransformResult, CINEMATIC_INSTRUCTION,
    NO_IMAGE_MESSAGE,
};
