//! Configuration management for the run club engine
//!
//! Supports loading configuration from:
//! - `config/default.*` and `config/{env}.*` files (any format `config` reads)
//! - Environment variables (`RUNCLUB__` prefix, `__` separator)
//!
//! Provider credentials fall back to the conventional `GROQ_API_KEY`,
//! `OPENAI_API_KEY` and `ANTHROPIC_API_KEY` variables.

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, EmbeddingSettings, LlmSettings, ObservabilityConfig,
    ProviderSettings, RagConfig, RerankerSettings, RuntimeEnvironment, ServerConfig,
    SessionConfig, Settings, VectorStoreSettings, KNOWN_PROVIDERS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
