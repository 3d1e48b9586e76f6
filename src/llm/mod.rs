//! LLM integration for note-forge.
//!
//! Generators talk to models through the [`LlmProvider`] trait. Concrete
//! providers speak the OpenAI-compatible chat-completions protocol:
//!
//! - [`OpenRouterProvider`]: hosted multi-model endpoint
//! - [`LiteLlmClient`]: self-hosted LiteLLM proxy
//!
//! ```ignore
//! use note_forge::llm::{GenerationRequest, LlmProvider, Message, ProviderRegistry};
//!
//! let registry = ProviderRegistry::from_env()?;
//! let provider = registry.get("openrouter")?;
//! let request = GenerationRequest::new(
//!     "openai/gpt-4o-mini",
//!     vec![Message::user("Outline the Krebs cycle")],
//! );
//! let response = provider.generate(request).await?;
//! ```

pub mod litellm;
pub mod providers;
pub mod registry;
pub(crate) mod wire;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
pub use providers::OpenRouterProvider;
pub use registry::{ProviderRegistry, LITELLM, OPENROUTER};
