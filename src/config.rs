//! Run configuration.
//!
//! Format:
//! ```toml
//! [provider]
//! name = "groq"
//! model = "llama-3.1-8b-instant"
//!
//! [analysis]
//! chunk_size = 1500
//! prompt_dir = "prompts"
//!
//! [memory]
//! backend = "sqlite"
//! path = ".review-memory.db"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReviewError, Result};
use crate::memory::MemoryConfig;
use crate::model::{ModelClientConfig, Provider};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub provider: ProviderConfig,
    pub analysis: AnalysisConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: Provider,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Prefer the provider's environment variable over storing keys here.
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Tuning knobs of the analysis engine and the planning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Chunks shorter than this get memory context even without a focus hint.
    pub augment_threshold: usize,
    /// Records fetched from memory per block.
    pub memory_top_k: usize,
    /// Symbol names turned into memory queries per block.
    pub symbol_queries: usize,
    /// Recent file summaries offered as cross-file context.
    pub context_summaries: usize,
    /// Memory snippets are cut to this many characters.
    pub snippet_chars: usize,
    /// Action log entries shown to the planner.
    pub action_log_window: usize,
    pub prompt_dir: Option<PathBuf>,
    /// Parent directory for cloned repositories.
    pub sandbox_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            augment_threshold: 400,
            memory_top_k: 3,
            symbol_queries: 3,
            context_summaries: 3,
            snippet_chars: 500,
            action_log_window: 10,
            prompt_dir: None,
            sandbox_dir: PathBuf::from("sandbox"),
        }
    }
}

impl ReviewConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReviewError::Config(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ReviewError::Config(format!("invalid config '{}': {}", path.display(), e))
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ReviewError::Config(format!("invalid config: {}", e)))
    }

    /// Resolves the model client settings against the process environment.
    pub fn model_client_config(&self) -> Result<ModelClientConfig> {
        self.model_client_config_with(|name| std::env::var(name).ok())
    }

    pub fn model_client_config_with<F>(&self, lookup: F) -> Result<ModelClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = self.provider.name;
        let first_set = |vars: &[&str]| {
            vars.iter()
                .filter_map(|name| lookup(*name))
                .find(|value| !value.trim().is_empty())
        };

        let api_key = non_blank(self.provider.api_key.clone())
            .or_else(|| first_set(provider.api_key_vars()));
        if provider.requires_api_key() && api_key.is_none() {
            return Err(ReviewError::Config(format!(
                "no credentials for provider '{}': set {}",
                provider,
                provider.api_key_vars().join(" or ")
            )));
        }

        let mut config = ModelClientConfig::for_provider(provider, api_key);
        if let Some(endpoint) =
            non_blank(self.provider.endpoint.clone()).or_else(|| first_set(provider.base_url_vars()))
        {
            config.endpoint = endpoint;
        }
        if let Some(model) = non_blank(self.provider.model.clone()) {
            config.model = model;
        }
        if let Some(secs) = self.provider.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }

        debug!(
            provider = %provider,
            model = %config.model,
            endpoint = %config.endpoint,
            "Resolved model client"
        );
        Ok(config)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReviewConfig::from_toml("").unwrap();
        assert_eq!(config.provider.name, Provider::Kobold);
        assert_eq!(config.analysis.chunk_size, 1500);
        assert_eq!(config.analysis.action_log_window, 10);
        assert_eq!(config.memory.backend, MemoryBackend::Sqlite);
        assert!(config.memory.reset_on_open);
    }

    #[test]
    fn test_parse_all_sections() {
        let config = ReviewConfig::from_toml(
            r#"
            [provider]
            name = "gigachat"
            model = "GigaChat-Pro"
            timeout_secs = 30

            [analysis]
            chunk_size = 800
            prompt_dir = "prompts"

            [memory]
            backend = "linear"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider.name, Provider::GigaChat);
        assert_eq!(config.provider.model.as_deref(), Some("GigaChat-Pro"));
        assert_eq!(config.analysis.chunk_size, 800);
        assert_eq!(config.analysis.augment_threshold, 400);
        assert_eq!(config.analysis.prompt_dir, Some(PathBuf::from("prompts")));
        assert_eq!(config.memory.backend, MemoryBackend::Linear);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let result = ReviewConfig::from_toml("[provider]\nname = \"mystery\"\n");
        assert!(matches!(result, Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = ReviewConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("review.toml");
        fs::write(&path, "[provider]\nname = \"groq\"\n").unwrap();

        let config = ReviewConfig::from_file(&path).unwrap();
        assert_eq!(config.provider.name, Provider::Groq);
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        let mut config = ReviewConfig::default();
        config.provider.name = Provider::OpenAi;

        let err = config.model_client_config_with(env(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let blank = config.model_client_config_with(env(&[("OPENAI_API_KEY", " ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_gigachat_accepts_either_token_variable() {
        let mut config = ReviewConfig::default();
        config.provider.name = Provider::GigaChat;

        let resolved = config
            .model_client_config_with(env(&[("GIGACHAT_TOKEN", "t2")]))
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("t2"));
        assert_eq!(resolved.model, "GigaChat");
    }

    #[test]
    fn test_endpoint_precedence() {
        let mut config = ReviewConfig::default();
        let lookup = env(&[
            ("KOBOLD_BASE_URL", "http://kobold:5001"),
            ("OPENAI_BASE_URL", "http://openai-compatible:8000"),
        ]);

        let from_env = config.model_client_config_with(&lookup).unwrap();
        assert_eq!(from_env.endpoint, "http://kobold:5001");
        assert!(from_env.api_key.is_none());

        config.provider.endpoint = Some("http://explicit:1".to_string());
        let explicit = config.model_client_config_with(&lookup).unwrap();
        assert_eq!(explicit.endpoint, "http://explicit:1");

        let defaults = ReviewConfig::default()
            .model_client_config_with(env(&[]))
            .unwrap();
        assert_eq!(defaults.endpoint, Provider::Kobold.default_endpoint());
        assert_eq!(defaults.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_config_key_wins_over_environment() {
        let mut config = ReviewConfig::default();
        config.provider.name = Provider::Groq;
        config.provider.api_key = Some("from-config".to_string());

        let resolved = config
            .model_client_config_with(env(&[("GROQ_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("from-config"));
    }
}
