//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, llm, rag, session, timeouts};
use crate::ConfigError;

/// Provider names accepted in `llm.providers`
pub const KNOWN_PROVIDERS: &[&str] = &["groq", "openai", "ollama", "claude"];

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    /// Retrieval and ranking tunables
    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub reranker: RerankerSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_rag()?;
        self.validate_embedding()?;
        self.validate_llm()?;

        if self.session.ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "session.ttl_seconds",
                "TTL must be at least 1 second",
            ));
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::invalid("server.port", "Port cannot be 0"));
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "server.timeout_seconds",
                "Timeout must be at least 1 second",
            ));
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured, allowing any origin"
            );
        }

        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if rag.top_k == 0 || rag.qa_top_k == 0 {
            return Err(ConfigError::invalid("rag.top_k", "Must be at least 1"));
        }

        if rag.candidate_pool < rag.top_k.max(rag.qa_top_k) {
            return Err(ConfigError::invalid(
                "rag.candidate_pool",
                format!(
                    "Must be at least max(top_k, qa_top_k) = {}, got {}",
                    rag.top_k.max(rag.qa_top_k),
                    rag.candidate_pool
                ),
            ));
        }

        if rag.alpha_km < 0.0 || !rag.alpha_km.is_finite() {
            return Err(ConfigError::invalid(
                "rag.alpha_km",
                format!("Must be a non-negative number, got {}", rag.alpha_km),
            ));
        }

        if rag.distance_tolerance_km <= 0.0 {
            return Err(ConfigError::invalid(
                "rag.distance_tolerance_km",
                format!("Must be positive, got {}", rag.distance_tolerance_km),
            ));
        }

        if rag.max_expansions == 0 || rag.max_expansions > rag::MAX_EXPANSIONS {
            return Err(ConfigError::invalid(
                "rag.max_expansions",
                format!("Must be between 1 and {}", rag::MAX_EXPANSIONS),
            ));
        }

        if rag.encoder_cache_capacity == 0 {
            tracing::warn!("rag.encoder_cache_capacity is 0, query encodings will not be cached");
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::invalid(
                "embedding.dimension",
                "Must be at least 1",
            ));
        }

        match self.embedding.provider.as_str() {
            "ollama" | "openai" => Ok(()),
            other => Err(ConfigError::invalid(
                "embedding.provider",
                format!("Unknown embedding provider '{}'", other),
            )),
        }
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        for name in &self.llm.providers {
            if !KNOWN_PROVIDERS.contains(&name.to_lowercase().as_str()) {
                return Err(ConfigError::invalid(
                    "llm.providers",
                    format!(
                        "Unknown provider '{}', expected one of {:?}",
                        name, KNOWN_PROVIDERS
                    ),
                ));
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            ));
        }

        if self.llm.providers.is_empty() {
            tracing::warn!("No LLM providers configured, answers will be templated or extractive");
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    timeouts::HTTP_REQUEST_SECS
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Qdrant connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_qdrant_api_key")]
    pub api_key: Option<String>,

    /// Distance metric the collection was created with: cosine, dot or euclid
    #[serde(default = "default_distance")]
    pub distance: String,
}

fn default_qdrant_endpoint() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| endpoints::QDRANT_DEFAULT.to_string())
}
fn default_collection() -> String {
    rag::COLLECTION.to_string()
}
fn default_qdrant_api_key() -> Option<String> {
    std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty())
}
fn default_distance() -> String {
    "cosine".to_string()
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            collection: default_collection(),
            api_key: default_qdrant_api_key(),
            distance: default_distance(),
        }
    }
}

/// Retrieval and ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_candidate_pool")]
    pub candidate_pool: usize,

    /// Context size for conversational answers
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Context size for bulk question answering
    #[serde(default = "default_qa_top_k")]
    pub qa_top_k: usize,

    /// Weight of the distance-mismatch penalty
    #[serde(default = "default_alpha_km")]
    pub alpha_km: f64,

    /// Half-width of the distance window, km
    #[serde(default = "default_tolerance")]
    pub distance_tolerance_km: f64,

    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Domain synonyms appended to every expansion
    #[serde(default = "default_synonyms")]
    pub synonyms: Vec<String>,

    #[serde(default = "default_cache_capacity")]
    pub encoder_cache_capacity: u64,
}

fn default_candidate_pool() -> usize {
    rag::CANDIDATE_POOL
}
fn default_top_k() -> usize {
    rag::DEFAULT_TOP_K
}
fn default_qa_top_k() -> usize {
    rag::QA_TOP_K
}
fn default_alpha_km() -> f64 {
    rag::ALPHA_KM
}
fn default_tolerance() -> f64 {
    rag::DISTANCE_TOLERANCE_KM
}
fn default_max_expansions() -> usize {
    rag::MAX_EXPANSIONS
}
fn default_synonyms() -> Vec<String> {
    ["lari", "running", "run", "jogging"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_cache_capacity() -> u64 {
    rag::ENCODER_CACHE_CAPACITY
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            candidate_pool: default_candidate_pool(),
            top_k: default_top_k(),
            qa_top_k: default_qa_top_k(),
            alpha_km: default_alpha_km(),
            distance_tolerance_km: default_tolerance(),
            max_expansions: default_max_expansions(),
            synonyms: default_synonyms(),
            encoder_cache_capacity: default_cache_capacity(),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// `ollama` or `openai` (any OpenAI-compatible `/embeddings` endpoint)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Must match the stored vectors
    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_ms: u64,
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_ollama_endpoint() -> String {
    std::env::var("OLLAMA_URL").unwrap_or_else(|_| endpoints::OLLAMA_DEFAULT.to_string())
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_embedding_dim() -> usize {
    rag::EMBEDDING_DIM
}
fn default_embedding_timeout() -> u64 {
    timeouts::EMBEDDING_MS
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
            api_key: None,
            timeout_ms: default_embedding_timeout(),
        }
    }
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_reranker_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_reranker_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_rerank_timeout")]
    pub timeout_ms: u64,
}

fn default_reranker_endpoint() -> String {
    endpoints::RERANKER_DEFAULT.to_string()
}
fn default_reranker_model() -> String {
    "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()
}
fn default_rerank_timeout() -> u64 {
    timeouts::RERANK_MS
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_reranker_endpoint(),
            model: default_reranker_model(),
            api_key: None,
            timeout_ms: default_rerank_timeout(),
        }
    }
}

/// One LLM provider section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderSettings {
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderSettings {
    /// Configured key, else the conventional environment variable
    pub fn resolved_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// LLM provider chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Providers in priority order
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,

    /// Context characters rendered into a prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default)]
    pub groq: ProviderSettings,

    #[serde(default)]
    pub openai: ProviderSettings,

    #[serde(default)]
    pub ollama: ProviderSettings,

    #[serde(default)]
    pub claude: ProviderSettings,
}

fn default_providers() -> Vec<String> {
    vec!["groq".to_string(), "openai".to_string()]
}
fn default_temperature() -> f32 {
    llm::TEMPERATURE
}
fn default_max_tokens() -> u32 {
    llm::MAX_TOKENS
}
fn default_llm_timeout() -> u64 {
    timeouts::LLM_REQUEST_MS
}
fn default_max_context_chars() -> usize {
    llm::MAX_CONTEXT_CHARS
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_llm_timeout(),
            max_context_chars: default_max_context_chars(),
            groq: ProviderSettings::default(),
            openai: ProviderSettings::default(),
            ollama: ProviderSettings::default(),
            claude: ProviderSettings::default(),
        }
    }
}

/// Session memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,

    #[serde(default = "default_session_id")]
    pub default_session_id: String,
}

fn default_ttl() -> u64 {
    session::TTL_SECS
}
fn default_session_id() -> String {
    session::DEFAULT_SESSION_ID.to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            default_session_id: default_session_id(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from `config/` and the environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from("config", env)
}

/// Load settings from an explicit config directory
pub fn load_settings_from(dir: &str, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name(&format!("{}/default", dir)).required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("{}/{}", dir, env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("RUNCLUB")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("llm.providers")
            .with_list_parse_key("rag.synonyms")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.rag.candidate_pool, 80);
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.session.ttl_seconds, 3600);
        assert!((settings.rag.alpha_km - 0.6).abs() < f64::EPSILON);
        assert_eq!(settings.llm.providers, vec!["groq", "openai"]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rag_validation() {
        let mut settings = Settings::default();
        settings.rag.alpha_km = -0.1;
        assert!(settings.validate().is_err());

        settings.rag.alpha_km = 0.0;
        assert!(settings.validate().is_ok());

        settings.rag.candidate_pool = 10;
        assert!(settings.validate().is_err());

        settings.rag.candidate_pool = 80;
        settings.rag.max_expansions = 7;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut settings = Settings::default();
        settings.llm.providers = vec!["groq".into(), "mystery".into()];
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut settings = Settings::default();
        settings.session.ttl_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_provider_key_prefers_config() {
        let provider = ProviderSettings {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        assert_eq!(
            provider.resolved_api_key("RUNCLUB_TEST_UNSET_KEY"),
            Some("from-config".to_string())
        );

        let blank = ProviderSettings {
            api_key: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(blank.resolved_api_key("RUNCLUB_TEST_UNSET_KEY"), None);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9000}}, "rag": {{"alpha_km": 0.8, "top_k": 3}}}}"#
        )
        .unwrap();

        let settings = load_settings_from(dir.path().to_str().unwrap(), None).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.rag.top_k, 3);
        assert!((settings.rag.alpha_km - 0.8).abs() < 1e-9);
        assert_eq!(settings.rag.candidate_pool, 80);
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.json");
        std::fs::write(&path, r#"{"server": {"port": 0}}"#).unwrap();

        assert!(load_settings_from(dir.path().to_str().unwrap(), None).is_err());
    }
}
