//! Cross-encoder reranking
//!
//! Re-scores (query, summary) pairs with a cross-encoder served over HTTP
//! (TEI, Jina and Cohere style `/rerank` bodies are accepted).
//!
//! ## Failure semantics
//!
//! The encoder is loaded once on first use. If loading fails, or any scoring
//! call fails, the failure is logged, the reranker is disabled for the rest
//! of the process lifetime, and ordering falls back to the hybrid score.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;

use runclub_config::constants::{endpoints, timeouts};
use runclub_config::RerankerSettings;
use runclub_core::CandidateRecord;

use crate::hybrid::HybridScorer;
use crate::RagError;

/// Consumed re-ranking model interface; higher score is more relevant
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RagError>;

    fn model_name(&self) -> &str;
}

/// Reranker configuration
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::RERANKER_DEFAULT.to_string(),
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            api_key: None,
            timeout_ms: timeouts::RERANK_MS,
        }
    }
}

impl From<&RerankerSettings> for RerankerConfig {
    fn from(settings: &RerankerSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            timeout_ms: settings.timeout_ms,
        }
    }
}

/// Cross-encoder behind an HTTP `/rerank` endpoint
pub struct HttpCrossEncoder {
    client: Client,
    config: RerankerConfig,
}

impl HttpCrossEncoder {
    pub fn new(config: RerankerConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::RerankerUnavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap, RagError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| RagError::RerankerUnavailable(format!("Invalid API key: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.config.endpoint);
        let body = serde_json::json!({
            "model": self.config.model,
            "query": query,
            "documents": texts,
            "texts": texts,
        });

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::RerankerUnavailable(format!("Rerank request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::RerankerUnavailable(format!(
                "Rerank API error: {} - {}",
                status, text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RagError::RerankerUnavailable(format!("Invalid rerank response: {}", e)))?;

        parse_rerank_response(json, texts.len())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Align scores to input order from `{"results"|"data": [...]}` or a bare array
pub(crate) fn parse_rerank_response(json: Value, doc_count: usize) -> Result<Vec<f32>, RagError> {
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .unwrap_or(&json)
        .as_array()
        .ok_or_else(|| RagError::RerankerUnavailable("Rerank response is missing results".into()))?;

    let mut scores: Vec<Option<f32>> = vec![None; doc_count];
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RagError::RerankerUnavailable("Rerank result missing index".into()))?
            as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| RagError::RerankerUnavailable("Rerank result missing score".into()))?
            as f32;
        if let Some(slot) = scores.get_mut(index) {
            *slot = Some(score);
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| RagError::RerankerUnavailable(format!("No score for document {}", i)))
        })
        .collect()
}

type Loader = Box<dyn Fn() -> Result<Arc<dyn CrossEncoder>, RagError> + Send + Sync>;

/// Reranking stage with one-shot loading and permanent fallback
pub struct Reranker {
    loader: Option<Loader>,
    encoder: OnceCell<Option<Arc<dyn CrossEncoder>>>,
    disabled: AtomicBool,
}

impl Reranker {
    /// Stage around an already constructed encoder
    pub fn new(encoder: Arc<dyn CrossEncoder>) -> Self {
        Self {
            loader: None,
            encoder: OnceCell::with_value(Some(encoder)),
            disabled: AtomicBool::new(false),
        }
    }

    /// Stage that constructs its encoder on first use, at most once
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn CrossEncoder>, RagError> + Send + Sync + 'static,
    {
        Self {
            loader: Some(Box::new(loader)),
            encoder: OnceCell::new(),
            disabled: AtomicBool::new(false),
        }
    }

    /// Stage that always orders by hybrid score
    pub fn disabled() -> Self {
        Self {
            loader: None,
            encoder: OnceCell::with_value(None),
            disabled: AtomicBool::new(true),
        }
    }

    pub fn from_settings(settings: &RerankerSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }
        let config = RerankerConfig::from(settings);
        Self::lazy(move || {
            HttpCrossEncoder::new(config.clone()).map(|e| Arc::new(e) as Arc<dyn CrossEncoder>)
        })
    }

    /// False once disabled by config or by a failure
    pub fn is_available(&self) -> bool {
        !self.disabled.load(Ordering::Acquire)
    }

    fn disable(&self, reason: &str) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            tracing::warn!(reason, "Cross-encoder disabled for the rest of the process lifetime");
        }
    }

    fn encoder(&self) -> Option<Arc<dyn CrossEncoder>> {
        self.encoder
            .get_or_init(|| {
                let loader = self.loader.as_ref()?;
                match loader() {
                    Ok(encoder) => {
                        tracing::info!(model = encoder.model_name(), "Cross-encoder loaded");
                        Some(encoder)
                    },
                    Err(e) => {
                        self.disable(&e.to_string());
                        None
                    },
                }
            })
            .clone()
    }

    /// Order hybrid-scored candidates and keep the first `top_k`
    ///
    /// With scores: descending cross-encoder score, then ascending hybrid
    /// score, then ascending vector distance. Without: ascending hybrid.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<CandidateRecord>,
        top_k: usize,
    ) -> Vec<CandidateRecord> {
        let encoder = if self.is_available() {
            self.encoder()
        } else {
            None
        };

        let scored = match encoder {
            Some(encoder) if !candidates.is_empty() => {
                let texts: Vec<String> = candidates.iter().map(|c| c.summary().to_string()).collect();
                match encoder.score(query, &texts).await {
                    Ok(scores) if scores.len() == candidates.len() => {
                        for (c, s) in candidates.iter_mut().zip(scores) {
                            c.cross_encoder_score = Some(s);
                        }
                        true
                    },
                    Ok(scores) => {
                        self.disable(&format!(
                            "score count mismatch: {} for {} candidates",
                            scores.len(),
                            candidates.len()
                        ));
                        false
                    },
                    Err(e) => {
                        self.disable(&e.to_string());
                        false
                    },
                }
            },
            _ => false,
        };

        if scored {
            candidates.sort_by(|a, b| {
                let ca = a.cross_encoder_score.unwrap_or(f32::MIN);
                let cb = b.cross_encoder_score.unwrap_or(f32::MIN);
                cb.total_cmp(&ca)
                    .then(a.hybrid_or_vector().total_cmp(&b.hybrid_or_vector()))
                    .then(a.vector_distance.total_cmp(&b.vector_distance))
            });
        } else {
            if !candidates.is_empty() {
                metrics::counter!("runclub_reranker_fallback_total").increment(1);
            }
            for c in candidates.iter_mut() {
                c.cross_encoder_score = None;
            }
            HybridScorer::sort(&mut candidates);
        }

        candidates.truncate(top_k);
        candidates
    }
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("available", &self.is_available())
            .finish()
    }
}
