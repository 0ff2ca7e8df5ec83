//! Embedding model seam
//!
//! The [`Embedder`] trait is the consumed "embedding model" interface.
//! Two HTTP implementations exist: Ollama (`ollama_embeddings`) and any
//! OpenAI-compatible `/embeddings` endpoint (below).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;

use runclub_config::constants::endpoints;
use runclub_config::EmbeddingSettings;

use crate::RagError;

/// Maps texts to fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Dimensionality of returned vectors
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl From<&EmbeddingSettings> for OpenAiEmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        let endpoint = if settings.endpoint == endpoints::OLLAMA_DEFAULT {
            endpoints::OPENAI_DEFAULT.to_string()
        } else {
            settings.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            endpoint,
            model: settings.model.clone(),
            api_key: settings
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
            dimension: settings.dimension,
            timeout_ms: settings.timeout_ms,
        }
    }
}

/// Embedder for OpenAI-compatible APIs
pub struct OpenAiCompatEmbedder {
    client: Client,
    config: OpenAiEmbeddingConfig,
}

impl OpenAiCompatEmbedder {
    pub fn new(config: OpenAiEmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap, RagError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| RagError::EncoderUnavailable(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.config.endpoint);
        let body = serde_json::json!({ "model": self.config.model, "input": texts });

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::EncoderUnavailable(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::EncoderUnavailable(format!(
                "Embedding API error: {} - {}",
                status, text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        parse_embedding_response(json)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Extract vectors from a `{"data": [{"index", "embedding"}]}` body, in index order
pub(crate) fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RagError::Embedding("Embedding response is missing data array".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback_index, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(fallback_index);
        let embedding = item
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RagError::Embedding("Embedding item missing embedding array".into()))?;
        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|n| n as f32)
                    .ok_or_else(|| RagError::Embedding("Embedding value must be numeric".into()))
            })
            .collect::<Result<Vec<f32>, RagError>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Build the embedder named by `settings.provider`
pub fn embedder_from_settings(
    settings: &EmbeddingSettings,
) -> Result<std::sync::Arc<dyn Embedder>, RagError> {
    match settings.provider.as_str() {
        "openai" => Ok(std::sync::Arc::new(OpenAiCompatEmbedder::new(
            OpenAiEmbeddingConfig::from(settings),
        )?)),
        _ => Ok(std::sync::Arc::new(crate::OllamaEmbedder::new(
            crate::OllamaEmbeddingConfig::from(settings),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_embeddings_in_index_order() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0, 3.0] },
                { "index": 0, "embedding": [0.5, 1.5] }
            ]
        });
        let parsed = parse_embedding_response(json).unwrap();
        assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
    }

    #[test]
    fn test_rejects_missing_data() {
        let json = serde_json::json!({ "error": "nope" });
        assert!(matches!(
            parse_embedding_response(json),
            Err(RagError::Embedding(_))
        ));
    }
}
