//! Remote model backends.

mod gemini;

pub use gemini::{GeminiBackend, GeminiBackendBuilder, GeminiModel, API_KEY_ENV_VARS};
