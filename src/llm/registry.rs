//! Provider lookup by name.
//!
//! A [`ProviderConfig`](crate::pipeline::ProviderConfig) names a provider
//! (`"openrouter"`, `"litellm"`, ...) and a model. The registry resolves the
//! provider name to a shared client.

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use super::litellm::{LiteLlmClient, LlmProvider};
use super::providers::OpenRouterProvider;
use crate::error::{GeneratorError, LlmError};

/// Registry name of the OpenRouter provider.
pub const OPENROUTER: &str = "openrouter";

/// Registry name of the LiteLLM provider.
pub const LITELLM: &str = "litellm";

/// Named LLM providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(name, provider);
        self
    }

    /// Resolves a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn LlmProvider>, GeneratorError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| GeneratorError::UnknownProvider(name.to_string()))
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Returns true if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Builds a registry from the environment.
    ///
    /// - `OPENROUTER_API_KEY` registers [`OPENROUTER`]
    /// - `LITELLM_API_BASE` registers [`LITELLM`]
    pub fn from_env() -> Result<Self, LlmError> {
        let mut registry = Self::new();

        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                registry.register(OPENROUTER, Arc::new(OpenRouterProvider::new(key)?));
            }
        }

        match LiteLlmClient::from_env() {
            Ok(client) => registry.register(LITELLM, Arc::new(client)),
            Err(LlmError::MissingApiBase) => {}
            Err(e) => return Err(e),
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
