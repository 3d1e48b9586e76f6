//! Generator collaborators for the two pipeline phases.
//!
//! 1. **Structure** - drafts an outline for a topic
//! 2. **Content** - expands an approved outline into the finished note
//!
//! Every error a generator returns is treated as transient: the pipeline
//! retries it with backoff and counts it against the circuit breaker.
//!
//! # Example
//!
//! ```ignore
//! use note_forge::generator::{LlmNoteGenerator, StructureGenerator};
//! use note_forge::llm::ProviderRegistry;
//! use note_forge::pipeline::ProviderConfig;
//!
//! let generator = LlmNoteGenerator::new(ProviderRegistry::from_env()?);
//! let provider = ProviderConfig::new("openrouter", "openai/gpt-4o-mini");
//! let outline = generator
//!     .generate_structure("The Krebs cycle", &provider, None)
//!     .await?;
//! ```

pub mod llm;

pub use llm::LlmNoteGenerator;

use async_trait::async_trait;

use crate::error::GeneratorError;
use crate::pipeline::config::ProviderConfig;

/// Drafts an outline for a topic.
#[async_trait]
pub trait StructureGenerator: Send + Sync {
    /// Returns the outline text.
    async fn generate_structure(
        &self,
        topic: &str,
        provider: &ProviderConfig,
        customization: Option<&str>,
    ) -> Result<String, GeneratorError>;
}

/// Expands an outline into the finished note.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns the note content.
    async fn generate_content(
        &self,
        topic: &str,
        structure: &str,
        provider: &ProviderConfig,
        customization: Option<&str>,
    ) -> Result<String, GeneratorError>;
}
