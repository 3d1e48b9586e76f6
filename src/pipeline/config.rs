//! Configuration for the note pipeline.
//!
//! Two layers of configuration exist:
//! - [`PipelineConfig`]: chosen per run (providers, auto-approve, prompt
//!   customization, target collection) and held for the run's duration.
//! - [`SchedulerSettings`]: process-level knobs (retry policy, cooldown,
//!   storage locations), usually read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::retry::RetryPolicy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Provider and model used for one generation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name as registered in the provider registry (e.g. "openrouter").
    pub provider: String,
    /// Model identifier passed to the provider.
    pub model: String,
}

impl ProviderConfig {
    /// Creates a provider selection.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Default collection name for persisted notes.
pub const DEFAULT_COLLECTION: &str = "notes";

/// Per-run pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Provider for the content phase (and the structure phase without override).
    pub provider: ProviderConfig,
    /// Optional override for the structure phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_provider: Option<ProviderConfig>,
    /// Skip the human review gate between phases.
    #[serde(default)]
    pub auto_approve: bool,
    /// Free-form text appended to generation prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_customization: Option<String>,
    /// Collection in the artifact store that receives finished notes.
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl PipelineConfig {
    /// Creates a configuration using `provider` for both phases.
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            structure_provider: None,
            auto_approve: false,
            prompt_customization: None,
            collection: default_collection(),
        }
    }

    /// Loads a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Provider used by the structure phase.
    pub fn structure_provider(&self) -> &ProviderConfig {
        self.structure_provider.as_ref().unwrap_or(&self.provider)
    }

    /// Provider used by the content phase.
    pub fn content_provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_provider(&self.provider, "provider")?;
        if let Some(ref structure) = self.structure_provider {
            validate_provider(structure, "structure_provider")?;
        }

        if self.collection.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "collection cannot be empty".to_string(),
            ));
        }

        if self
            .collection
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "collection '{}' may only contain alphanumerics, hyphens and underscores",
                self.collection
            )));
        }

        Ok(())
    }

    /// Builder method to set the structure-phase override.
    pub fn with_structure_provider(mut self, provider: ProviderConfig) -> Self {
        self.structure_provider = Some(provider);
        self
    }

    /// Builder method to set auto-approve.
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Builder method to set the prompt customization text.
    pub fn with_prompt_customization(mut self, text: impl Into<String>) -> Self {
        self.prompt_customization = Some(text.into());
        self
    }

    /// Builder method to set the target collection.
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

fn validate_provider(provider: &ProviderConfig, field: &str) -> Result<(), ConfigError> {
    if provider.provider.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{}.provider cannot be empty",
            field
        )));
    }
    if provider.model.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(format!(
            "{}.model cannot be empty",
            field
        )));
    }
    Ok(())
}

/// Process-level scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Retry limits and backoff.
    pub retry: RetryPolicy,
    /// Pause between successive items.
    pub cooldown: Duration,
    /// Resume errored items at the content phase when a structure is cached.
    pub resume_errored_at_content: bool,
    /// Capacity of the snapshot broadcast channel.
    pub event_capacity: usize,
    /// File holding the persisted queue.
    pub state_file: PathBuf,
    /// Root directory of the artifact store.
    pub artifact_path: PathBuf,
    /// Optional URL that receives a best-effort copy of every artifact.
    pub remote_sync_url: Option<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cooldown: Duration::from_millis(1000),
            resume_errored_at_content: false,
            event_capacity: 256,
            state_file: PathBuf::from("./note-forge-queue.json"),
            artifact_path: PathBuf::from("./artifacts"),
            remote_sync_url: None,
        }
    }
}

impl SchedulerSettings {
    /// Creates settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NOTE_FORGE_MAX_RETRIES`: Attempts per phase (default: 3)
    /// - `NOTE_FORGE_CIRCUIT_THRESHOLD`: Consecutive failures that open the circuit (default: 3)
    /// - `NOTE_FORGE_BASE_DELAY_MS`: Backoff base delay in ms (default: 2000)
    /// - `NOTE_FORGE_COOLDOWN_MS`: Pause between items in ms (default: 1000)
    /// - `NOTE_FORGE_RESUME_AT_CONTENT`: Resume errored items at the content phase (default: false)
    /// - `NOTE_FORGE_STATE_FILE`: Queue file (default: ./note-forge-queue.json)
    /// - `NOTE_FORGE_ARTIFACT_PATH`: Artifact directory (default: ./artifacts)
    /// - `NOTE_FORGE_REMOTE_SYNC_URL`: Optional remote sync endpoint
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Ok(val) = std::env::var("NOTE_FORGE_MAX_RETRIES") {
            settings.retry.max_retries = parse_env_value(&val, "NOTE_FORGE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_CIRCUIT_THRESHOLD") {
            settings.retry.circuit_threshold =
                parse_env_value(&val, "NOTE_FORGE_CIRCUIT_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_BASE_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "NOTE_FORGE_BASE_DELAY_MS")?;
            settings.retry.base_delay = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_COOLDOWN_MS") {
            let ms: u64 = parse_env_value(&val, "NOTE_FORGE_COOLDOWN_MS")?;
            settings.cooldown = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_RESUME_AT_CONTENT") {
            settings.resume_errored_at_content =
                parse_env_bool(&val, "NOTE_FORGE_RESUME_AT_CONTENT")?;
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_STATE_FILE") {
            settings.state_file = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_ARTIFACT_PATH") {
            settings.artifact_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("NOTE_FORGE_REMOTE_SYNC_URL") {
            if !val.trim().is_empty() {
                settings.remote_sync_url = Some(val);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.retry.circuit_threshold == 0 {
            return Err(ConfigError::ValidationFailed(
                "circuit_threshold must be greater than 0".to_string(),
            ));
        }

        // Exhausting an item's retries must always trip the breaker.
        if self.retry.circuit_threshold > self.retry.max_retries {
            return Err(ConfigError::ValidationFailed(format!(
                "circuit_threshold ({}) cannot exceed max_retries ({})",
                self.retry.circuit_threshold, self.retry.max_retries
            )));
        }

        if self.event_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "event_capacity must be greater than 0".to_string(),
            ));
        }

        if self.state_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "state_file cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to set the cooldown.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Builder method to resume errored items at the content phase.
    pub fn with_resume_errored_at_content(mut self, enabled: bool) -> Self {
        self.resume_errored_at_content = enabled;
        self
    }

    /// Builder method to set the broadcast capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Builder method to set the queue file.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Builder method to set the artifact directory.
    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    /// Builder method to set the remote sync URL.
    pub fn with_remote_sync_url(mut self, url: impl Into<String>) -> Self {
        self.remote_sync_url = Some(url.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openrouter() -> ProviderConfig {
        ProviderConfig::new("openrouter", "moonshotai/kimi-k2.5")
    }

    #[test]
    fn test_structure_provider_falls_back_to_main() {
        let config = PipelineConfig::new(openrouter());
        assert_eq!(config.structure_provider(), &openrouter());

        let override_provider = ProviderConfig::new("litellm", "gpt-4o-mini");
        let config = config.with_structure_provider(override_provider.clone());
        assert_eq!(config.structure_provider(), &override_provider);
        assert_eq!(config.content_provider(), &openrouter());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new(openrouter())
            .with_auto_approve(true)
            .with_prompt_customization("Use British spelling.")
            .with_collection("biology");

        assert!(config.auto_approve);
        assert_eq!(
            config.prompt_customization.as_deref(),
            Some("Use British spelling.")
        );
        assert_eq!(config.collection, "biology");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_model() {
        let config = PipelineConfig::new(ProviderConfig::new("openrouter", ""));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("provider.model"));
    }

    #[test]
    fn test_validation_bad_structure_override() {
        let config = PipelineConfig::new(openrouter())
            .with_structure_provider(ProviderConfig::new("", "model"));
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("structure_provider.provider"));
    }

    #[test]
    fn test_validation_collection_characters() {
        let config = PipelineConfig::new(openrouter()).with_collection("../escape");
        assert!(config.validate().is_err());

        let config = PipelineConfig::new(openrouter()).with_collection("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
provider:
  provider: openrouter
  model: moonshotai/kimi-k2.5
structure_provider:
  provider: litellm
  model: gpt-4o-mini
auto_approve: true
prompt_customization: "Aim at first-year students."
"#;
        let config = PipelineConfig::from_yaml_str(yaml).expect("valid yaml");
        assert!(config.auto_approve);
        assert_eq!(config.structure_provider().provider, "litellm");
        assert_eq!(config.collection, DEFAULT_COLLECTION);
    }

    #[test]
    fn test_from_yaml_str_rejects_invalid() {
        let yaml = "provider:\n  provider: openrouter\n  model: ''\n";
        assert!(matches!(
            PipelineConfig::from_yaml_str(yaml),
            Err(ConfigError::ValidationFailed(_))
        ));
        assert!(matches!(
            PipelineConfig::from_yaml_str("provider: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.cooldown, Duration::from_millis(1000));
        assert!(!settings.resume_errored_at_content);
        assert!(settings.remote_sync_url.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let settings = SchedulerSettings::default()
            .with_retry_policy(RetryPolicy::default().with_max_retries(0));
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_retries"));

        let settings = SchedulerSettings::default().with_retry_policy(
            RetryPolicy::default()
                .with_max_retries(2)
                .with_circuit_threshold(3),
        );
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationFailed(ref msg)) if msg.contains("cannot exceed max_retries")
        ));

        let settings = SchedulerSettings::default().with_retry_policy(
            RetryPolicy::default()
                .with_max_retries(5)
                .with_circuit_threshold(2),
        );
        assert!(settings.validate().is_ok());

        let settings = SchedulerSettings::default().with_event_capacity(0);
        assert!(settings
            .validate()
            .unwrap_err()
            .to_string()
            .contains("event_capacity"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("ON", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let value: u64 = parse_env_value("2500", "test").unwrap();
        assert_eq!(value, 2500);
        let err = parse_env_value::<u32>("abc", "NOTE_FORGE_MAX_RETRIES").unwrap_err();
        assert!(err.to_string().contains("NOTE_FORGE_MAX_RETRIES"));
    }
}
