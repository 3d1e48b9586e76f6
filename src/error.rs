//! Error types for note-forge operations.
//!
//! Defines the error taxonomy shared across the pipeline:
//! - LLM API interactions
//! - Structure and content generation (always retryable)
//! - Queue and artifact persistence

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Errors raised by a structure or content generator.
///
/// Every variant is treated as transient by the retry executor: the pipeline
/// converts it into a retry, and eventually into an item-level error message.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Generator returned an empty {phase}")]
    EmptyResponse { phase: String },

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl From<tera::Error> for GeneratorError {
    fn from(err: tera::Error) -> Self {
        GeneratorError::Prompt(err.to_string())
    }
}

/// Errors that can occur while persisting the queue or artifacts.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("Remote sync failed: {0}")]
    RemoteSync(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}
