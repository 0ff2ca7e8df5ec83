//! LLM Integration for grounded answers
//!
//! Features:
//! - Multiple backend support (Groq, OpenAI, Ollama, Claude)
//! - Provider chain with per-provider failure isolation
//! - Grounded and fact-guarded prompt construction with a context budget

pub mod backend;
pub mod chain;
pub mod claude;
pub mod factory;
pub mod prompt;

pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use chain::{Completion, ProviderChain};
pub use claude::{ClaudeBackend, ClaudeConfig};
pub use factory::{LlmFactory, LlmProvider};
pub use prompt::{Message, PromptBuilder, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    /// Missing or rejected credential
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Empty response")]
    EmptyResponse,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No providers configured")]
    NoProviders,

    #[error("All providers failed: {0}")]
    Exhausted(String),
}

impl LlmError {
    /// Credential or setup problems; the provider is unusable until reconfigured
    pub fn is_auth_error(&self) -> bool {
        matches!(self, LlmError::Unauthenticated(_) | LlmError::Configuration(_))
    }

    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for runclub_core::Error {
    fn from(err: LlmError) -> Self {
        runclub_core::Error::Llm(err.to_string())
    }
}
