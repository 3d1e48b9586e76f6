//! LLM-backed implementation of both generator traits.

use async_trait::async_trait;

use super::{ContentGenerator, StructureGenerator};
use crate::error::GeneratorError;
use crate::llm::{GenerationRequest, Message, ProviderRegistry};
use crate::pipeline::config::ProviderConfig;
use crate::prompts::{build_content_prompt, build_structure_prompt, NotePrompt};

/// Temperature for outline drafting.
const STRUCTURE_TEMPERATURE: f64 = 0.4;

/// Temperature for content generation.
const CONTENT_TEMPERATURE: f64 = 0.7;

/// Token budget for an outline.
const STRUCTURE_MAX_TOKENS: u32 = 2048;

/// Token budget for a full note.
const CONTENT_MAX_TOKENS: u32 = 8192;

/// Generates outlines and notes through registered LLM providers.
#[derive(Debug, Clone)]
pub struct LlmNoteGenerator {
    registry: ProviderRegistry,
}

impl LlmNoteGenerator {
    /// Creates a generator resolving providers from `registry`.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Returns the provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    async fn complete(
        &self,
        provider: &ProviderConfig,
        prompt: NotePrompt,
        temperature: f64,
        max_tokens: u32,
        phase: &str,
    ) -> Result<String, GeneratorError> {
        let client = self.registry.get(&provider.provider)?;
        let request = GenerationRequest::new(
            provider.model.clone(),
            vec![Message::system(prompt.system), Message::user(prompt.user)],
        )
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);

        let response = client.generate(request).await?;
        tracing::debug!(
            phase,
            provider = %provider,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "LLM call completed"
        );

        extract_text(response.first_content(), phase)
    }
}

#[async_trait]
impl StructureGenerator for LlmNoteGenerator {
    async fn generate_structure(
        &self,
        topic: &str,
        provider: &ProviderConfig,
        customization: Option<&str>,
    ) -> Result<String, GeneratorError> {
        let prompt = build_structure_prompt(topic, customization)?;
        self.complete(
            provider,
            prompt,
            STRUCTURE_TEMPERATURE,
            STRUCTURE_MAX_TOKENS,
            "structure",
        )
        .await
    }
}

#[async_trait]
impl ContentGenerator for LlmNoteGenerator {
    async fn generate_content(
        &self,
        topic: &str,
        structure: &str,
        provider: &ProviderConfig,
        customization: Option<&str>,
    ) -> Result<String, GeneratorError> {
        let prompt = build_content_prompt(topic, structure, customization)?;
        self.complete(
            provider,
            prompt,
            CONTENT_TEMPERATURE,
            CONTENT_MAX_TOKENS,
            "content",
        )
        .await
    }
}

/// Trims the completion and strips a wrapping ```markdown fence.
fn extract_text(content: Option<&str>, phase: &str) -> Result<String, GeneratorError> {
    let text = content.map(str::trim).unwrap_or_default();
    let text = strip_markdown_fence(text).trim();
    if text.is_empty() {
        return Err(GeneratorError::EmptyResponse {
            phase: phase.to_string(),
        });
    }
    Ok(text.to_string())
}

fn strip_markdown_fence(text: &str) -> &str {
    let Some(rest) = text
        .strip_prefix("```markdown")
        .or_else(|| text.strip_prefix("```md"))
    else {
        return text;
    };
    match rest.strip_suffix("```") {
        Some(inner) => inner,
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, LlmProvider, Usage};
    use std::sync::{Arc, Mutex};

    struct MockLlmProvider {
        reply: Option<String>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.requests.lock().expect("lock").push(request);
            match self.reply {
                Some(ref reply) => Ok(GenerationResponse {
                    id: "mock".to_string(),
                    model: "mock-model".to_string(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(reply.clone()),
                        finish_reason: "stop".to_string(),
                    }],
                    usage: Usage::default(),
                }),
                None => Err(LlmError::ApiError {
                    code: 503,
                    message: "overloaded".to_string(),
                }),
            }
        }
    }

    fn generator_with(provider: Arc<MockLlmProvider>) -> LlmNoteGenerator {
        LlmNoteGenerator::new(ProviderRegistry::new().with_provider("mock", provider))
    }

    #[tokio::test]
    async fn test_structure_uses_configured_model() {
        let mock = Arc::new(MockLlmProvider::replying("# Osmosis\n## Basics"));
        let generator = generator_with(mock.clone());
        let provider = ProviderConfig::new("mock", "small-model");

        let outline = generator
            .generate_structure("Osmosis", &provider, Some("keep it short"))
            .await
            .expect("outline generated");
        assert_eq!(outline, "# Osmosis\n## Basics");

        let requests = mock.requests.lock().expect("lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "small-model");
        assert_eq!(requests[0].temperature, Some(STRUCTURE_TEMPERATURE));
        assert!(requests[0].messages[1].content.contains("keep it short"));
    }

    #[tokio::test]
    async fn test_content_strips_markdown_fence() {
        let mock = Arc::new(MockLlmProvider::replying("```markdown\n# Note\nBody\n```"));
        let generator = generator_with(mock.clone());
        let provider = ProviderConfig::new("mock", "large-model");

        let content = generator
            .generate_content("Osmosis", "# Osmosis", &provider, None)
            .await
            .expect("content generated");
        assert_eq!(content, "# Note\nBody");
        let requests = mock.requests.lock().expect("lock");
        assert!(requests[0].messages[1].content.contains("# Osmosis"));
    }

    #[tokio::test]
    async fn test_blank_completion_is_an_error() {
        let generator = generator_with(Arc::new(MockLlmProvider::replying("  \n ")));
        let provider = ProviderConfig::new("mock", "m");

        let err = generator
            .generate_structure("Osmosis", &provider, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::EmptyResponse { ref phase } if phase == "structure"));
    }

    #[tokio::test]
    async fn test_provider_error_is_propagated() {
        let generator = generator_with(Arc::new(MockLlmProvider::failing()));
        let provider = ProviderConfig::new("mock", "m");

        let err = generator
            .generate_content("Osmosis", "# Osmosis", &provider, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Llm(LlmError::ApiError { code: 503, .. })));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let generator = LlmNoteGenerator::new(ProviderRegistry::new());
        let provider = ProviderConfig::new("nowhere", "m");

        let err = generator
            .generate_structure("Osmosis", &provider, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_strip_markdown_fence_leaves_plain_text() {
        assert_eq!(strip_markdown_fence("# Title"), "# Title");
        assert_eq!(strip_markdown_fence("```md\nx\n```"), "\nx\n");
        assert_eq!(strip_markdown_fence("```markdown\nunterminated"), "```markdown\nunterminated");
    }
}
