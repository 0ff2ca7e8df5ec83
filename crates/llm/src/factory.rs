//! LLM Factory - Provider Abstraction Layer
//!
//! Creates LLM backends from the provider name and the matching settings
//! section. Credentials come from config first, then the provider's
//! conventional environment variable.

use std::sync::Arc;
use std::time::Duration;

use runclub_config::constants::{endpoints, llm};
use runclub_config::{LlmSettings, ProviderSettings};

use crate::backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig};
use crate::claude::{ClaudeBackend, ClaudeConfig};
use crate::LlmError;

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Groq - hosted open models over an OpenAI-compatible API
    Groq,
    /// OpenAI - GPT family
    OpenAI,
    /// Ollama - local models
    Ollama,
    /// Claude (Anthropic)
    Claude,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Some(LlmProvider::Groq),
            "openai" | "gpt" => Some(LlmProvider::OpenAI),
            "ollama" | "local" => Some(LlmProvider::Ollama),
            "claude" | "anthropic" => Some(LlmProvider::Claude),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Groq => "groq",
            LlmProvider::OpenAI => "openai",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Claude => "claude",
        }
    }

    /// Environment variable holding the credential, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::Groq => Some("GROQ_API_KEY"),
            LlmProvider::OpenAI => Some("OPENAI_API_KEY"),
            LlmProvider::Claude => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Ollama => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Groq => llm::GROQ_MODEL,
            LlmProvider::OpenAI => llm::OPENAI_MODEL,
            LlmProvider::Ollama => llm::OLLAMA_MODEL,
            LlmProvider::Claude => llm::CLAUDE_MODEL,
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Groq => endpoints::GROQ_DEFAULT,
            LlmProvider::OpenAI => endpoints::OPENAI_DEFAULT,
            LlmProvider::Ollama => endpoints::OLLAMA_DEFAULT,
            LlmProvider::Claude => endpoints::ANTHROPIC_DEFAULT,
        }
    }

    fn section<'a>(&self, settings: &'a LlmSettings) -> &'a ProviderSettings {
        match self {
            LlmProvider::Groq => &settings.groq,
            LlmProvider::OpenAI => &settings.openai,
            LlmProvider::Ollama => &settings.ollama,
            LlmProvider::Claude => &settings.claude,
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory for creating LLM backends
pub struct LlmFactory;

impl LlmFactory {
    /// Build the backend for `provider` from the LLM settings.
    ///
    /// A missing credential yields `LlmError::Unauthenticated`.
    pub fn create(
        provider: LlmProvider,
        settings: &LlmSettings,
    ) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let section = provider.section(settings);
        let model = section
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());
        let endpoint = section
            .endpoint
            .clone()
            .unwrap_or_else(|| provider.default_endpoint().to_string());
        let api_key = provider
            .api_key_env()
            .and_then(|env| section.resolved_api_key(env));
        let timeout = Duration::from_millis(settings.timeout_ms);

        match provider {
            LlmProvider::Groq | LlmProvider::OpenAI => {
                let api_key = api_key.ok_or_else(|| {
                    LlmError::Unauthenticated(format!(
                        "{} requires {}",
                        provider,
                        provider.api_key_env().unwrap_or_default()
                    ))
                })?;
                let base = match provider {
                    LlmProvider::Groq => OpenAIConfig::groq(api_key, model),
                    _ => OpenAIConfig::openai(api_key, model),
                };
                let config = base
                    .with_endpoint(endpoint)
                    .with_temperature(settings.temperature)
                    .with_max_tokens(settings.max_tokens)
                    .with_timeout(timeout);
                Ok(Arc::new(OpenAIBackend::new(config)?))
            },
            LlmProvider::Ollama => {
                let config = LlmConfig {
                    model,
                    endpoint,
                    max_tokens: settings.max_tokens,
                    temperature: settings.temperature,
                    timeout,
                    ..Default::default()
                };
                Ok(Arc::new(OllamaBackend::new(config)?))
            },
            LlmProvider::Claude => {
                let api_key = api_key.ok_or_else(|| {
                    LlmError::Unauthenticated("claude requires ANTHROPIC_API_KEY".to_string())
                })?;
                let config = ClaudeConfig::new(api_key)
                    .with_model(model)
                    .with_endpoint(endpoint)
                    .with_max_tokens(settings.max_tokens)
                    .with_temperature(settings.temperature)
                    .with_timeout(timeout);
                Ok(Arc::new(ClaudeBackend::new(config)?))
            },
        }
    }
}
