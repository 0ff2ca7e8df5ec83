//! LLM Backend implementations
//!
//! Ollama (native `/api/chat`) and OpenAI-compatible chat completions, which
//! also covers Groq.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use runclub_config::constants::{endpoints, llm, timeouts};

use crate::prompt::Message;
use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// API endpoint
    pub endpoint: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
    /// Keep model loaded between calls ("5m", "-1", "0")
    pub keep_alive: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: llm::OLLAMA_MODEL.to_string(),
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            max_tokens: llm::MAX_TOKENS,
            temperature: llm::TEMPERATURE,
            timeout: Duration::from_millis(timeouts::LLM_REQUEST_MS),
            max_retries: 0,
            initial_backoff: Duration::from_millis(100),
            keep_alive: "5m".to_string(),
        }
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Tokens generated
    pub tokens: usize,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

impl FinishReason {
    pub(crate) fn from_api(reason: Option<&str>) -> Self {
        match reason {
            Some("length") | Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Stop,
        }
    }
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a response
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError>;

    /// Check if model is available
    async fn is_available(&self) -> bool;

    /// Get model name
    fn model_name(&self) -> &str;

    /// Short backend label (`groq`, `openai`, `ollama`, `claude`)
    fn backend_name(&self) -> &str;

    /// `<backend>:<model>`, reported as the answering provider
    fn provider_id(&self) -> String {
        format!("{}:{}", self.backend_name(), self.model_name())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// 401/403 are credential problems, 408/429/5xx are transient.
pub(crate) fn status_error(status: StatusCode, body: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::Unauthenticated(format!("HTTP {}: {}", status, body))
        },
        StatusCode::REQUEST_TIMEOUT => LlmError::Timeout,
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            LlmError::Network(format!("HTTP {}: {}", status, body))
        },
        _ => LlmError::Api(format!("HTTP {}: {}", status, body)),
    }
}

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Execute a single request (used by retry logic)
    async fn execute_request(
        &self,
        request: &OllamaChatRequest,
    ) -> Result<OllamaChatResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("/chat"))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    /// Generate a response with retry logic for transient failures
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(|m| m.into()).collect(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                num_predict: Some(self.config.max_tokens as i32),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        };

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    attempt,
                    max = self.config.max_retries,
                    "Ollama request failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(&request).await {
                Ok(result) => {
                    return Ok(GenerationResult {
                        text: result.message.content,
                        tokens: result.eval_count.unwrap_or(0) as usize,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        finish_reason: FinishReason::from_api(result.done_reason.as_deref()),
                    });
                },
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
}

// =============================================================================
// OpenAI-compatible Backend
// =============================================================================

/// Configuration for OpenAI-compatible backends
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Backend label used in provider ids
    pub label: String,
    /// API endpoint (OpenAI: https://api.openai.com/v1)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            label: "openai".to_string(),
            endpoint: endpoints::OPENAI_DEFAULT.to_string(),
            api_key: String::new(),
            model: llm::OPENAI_MODEL.to_string(),
            max_tokens: llm::MAX_TOKENS,
            temperature: llm::TEMPERATURE,
            timeout: Duration::from_millis(timeouts::LLM_REQUEST_MS),
        }
    }
}

impl OpenAIConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create config for Groq's OpenAI-compatible endpoint
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            label: "groq".to_string(),
            endpoint: endpoints::GROQ_DEFAULT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OpenAI-compatible backend
///
/// Works with OpenAI, Groq and local servers exposing `/chat/completions`.
pub struct OpenAIBackend {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self, LlmError> {
        let local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if config.api_key.trim().is_empty() && !local {
            return Err(LlmError::Unauthenticated(format!(
                "{} requires an API key",
                config.label
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResult, LlmError> {
        let start = std::time::Instant::now();

        let request = OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &error_text));
        }

        let response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let mut result = parse_chat_completion(response)?;
        result.total_time_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/models", self.config.endpoint.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn backend_name(&self) -> &str {
        &self.config.label
    }
}

fn parse_chat_completion(response: OpenAIChatResponse) -> Result<GenerationResult, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

    Ok(GenerationResult {
        text: choice.message.content.unwrap_or_default(),
        tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
        total_time_ms: 0,
        finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
    })
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "bad key").is_auth_error());
        assert!(status_error(StatusCode::FORBIDDEN, "").is_auth_error());
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "x"),
            LlmError::Api(_)
        ));
    }

    #[test]
    fn test_remote_backend_requires_key() {
        let err = OpenAIBackend::new(OpenAIConfig::groq("", "llama-3.1-8b-instant"))
            .err()
            .unwrap();
        assert!(err.is_auth_error());

        let local = OpenAIConfig::openai("", "local-model").with_endpoint("http://localhost:8000/v1");
        assert!(OpenAIBackend::new(local).is_ok());
    }

    #[test]
    fn test_provider_id() {
        let backend =
            OpenAIBackend::new(OpenAIConfig::groq("key", "llama-3.1-8b-instant")).unwrap();
        assert_eq!(backend.provider_id(), "groq:llama-3.1-8b-instant");

        let ollama = OllamaBackend::new(LlmConfig::default()).unwrap();
        assert_eq!(ollama.provider_id(), "ollama:llama3.1:8b");
    }

    #[test]
    fn test_parse_chat_completion() {
        let response: OpenAIChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Sari lari 10 km [1]"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 50, "completion_tokens": 7, "total_tokens": 57}
        }))
        .unwrap();

        let result = parse_chat_completion(response).unwrap();
        assert_eq!(result.text, "Sari lari 10 km [1]");
        assert_eq!(result.tokens, 7);
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn test_parse_chat_completion_without_choices() {
        let response: OpenAIChatResponse =
            serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_chat_completion(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_ollama_request_serialization() {
        let request = OllamaChatRequest {
            model: "llama3.1:8b".to_string(),
            messages: vec![ChatMessage::from(&Message::user("halo"))],
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(0.2),
                num_predict: None,
            }),
            keep_alive: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("keep_alive").is_none());
        assert!(json["options"].get("num_predict").is_none());
    }
}
