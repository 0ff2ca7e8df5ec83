//! Hybrid Retriever
//!
//! Normalize → expand → encode → nearest-neighbour candidates (filters
//! pushed down) → hybrid score → optional cross-encoder rerank → top-K.

use std::sync::Arc;

use async_trait::async_trait;

use runclub_config::Settings;
use runclub_core::{Query, RankedContext, RetrieveOptions, Retriever};

use crate::candidates::CandidateRetriever;
use crate::embeddings::Embedder;
use crate::encoder::{mean_pool, QueryEncoder};
use crate::hybrid::HybridScorer;
use crate::normalizer::QueryNormalizer;
use crate::query_expansion::{QueryExpander, QueryExpansionConfig};
use crate::reranker::Reranker;
use crate::vector_store::{CandidateFilter, VectorIndex};
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Weight of the distance-mismatch penalty
    pub alpha_km: f64,
    /// Half-width of the pushed-down distance window
    pub distance_tolerance_km: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&runclub_config::RagConfig::default())
    }
}

impl From<&runclub_config::RagConfig> for RetrieverConfig {
    fn from(config: &runclub_config::RagConfig) -> Self {
        Self {
            alpha_km: config.alpha_km,
            distance_tolerance_km: config.distance_tolerance_km,
        }
    }
}

pub struct HybridRetriever {
    config: RetrieverConfig,
    normalizer: QueryNormalizer,
    expander: QueryExpander,
    encoder: Arc<QueryEncoder>,
    candidates: CandidateRetriever,
    scorer: HybridScorer,
    reranker: Arc<Reranker>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrieverConfig,
        expander: QueryExpander,
        encoder: Arc<QueryEncoder>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self {
            scorer: HybridScorer::new(config.alpha_km),
            config,
            normalizer: QueryNormalizer::new(),
            expander,
            encoder,
            candidates: CandidateRetriever::new(index),
            reranker,
        }
    }

    /// Wire the retriever from settings around injected collaborators
    pub fn from_settings(
        settings: &Settings,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<Reranker>,
    ) -> Self {
        let encoder = Arc::new(QueryEncoder::new(
            embedder,
            settings.rag.encoder_cache_capacity,
            settings.embedding.dimension,
        ));
        Self::new(
            RetrieverConfig::from(&settings.rag),
            QueryExpander::new(QueryExpansionConfig::from(&settings.rag)),
            encoder,
            index,
            reranker,
        )
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.candidates.index()
    }

    pub fn reranker(&self) -> &Arc<Reranker> {
        &self.reranker
    }

    pub fn encoder(&self) -> &Arc<QueryEncoder> {
        &self.encoder
    }

    /// Structured filter for `query` under `options`
    pub fn build_filter(&self, query: &Query, options: &RetrieveOptions) -> CandidateFilter {
        let mut filter = CandidateFilter::new();
        if options.filter_subjects && !query.subjects.is_empty() {
            filter = filter.subjects(&query.subjects);
        }
        if options.distance_window {
            if let Some(km) = query.target_km {
                filter = filter.distance_window(km, self.config.distance_tolerance_km);
            }
        }
        if let Some(window) = query.window {
            filter = filter.time_window(window);
        }
        filter
    }

    /// Ranked context, or the typed failure
    pub async fn search(
        &self,
        query: &Query,
        options: &RetrieveOptions,
    ) -> Result<RankedContext, RagError> {
        let normalized = if query.normalized.trim().is_empty() {
            self.normalizer.normalize(&query.raw)
        } else {
            query.normalized.clone()
        };
        if normalized.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let terms = self.expander.expand(&normalized, query.target_km);
        let term_vectors = self.encoder.encode_terms(&terms).await?;

        let mut vectors = vec![Arc::new(mean_pool(&term_vectors))];
        if term_vectors.len() > 1 {
            vectors.extend(term_vectors);
        }

        let filter = self.build_filter(query, options);
        let mut candidates = self
            .candidates
            .retrieve(&vectors, &filter, options.candidate_pool.max(options.top_k))
            .await?;

        if candidates.is_empty() {
            tracing::debug!(query = %normalized, "No candidates matched");
            return Ok(RankedContext::empty());
        }

        self.scorer.apply(&mut candidates, query.target_km);

        let ranked = if options.rerank {
            self.reranker
                .rerank(&normalized, candidates, options.top_k)
                .await
        } else {
            HybridScorer::sort(&mut candidates);
            candidates.truncate(options.top_k);
            candidates
        };

        tracing::debug!(
            terms = terms.len(),
            returned = ranked.len(),
            reranked = ranked.iter().all(|c| c.cross_encoder_score.is_some()),
            "Retrieval complete"
        );

        Ok(RankedContext::new(ranked))
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(
        &self,
        query: &Query,
        options: &RetrieveOptions,
    ) -> runclub_core::Result<RankedContext> {
        match self.search(query, options).await {
            Ok(context) => Ok(context),
            Err(e) if e.is_degradable() => {
                tracing::warn!(error = %e, "Retrieval degraded to empty context");
                Ok(RankedContext::empty())
            },
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "hybrid"
    }
}
