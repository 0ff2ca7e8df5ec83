//! Query encoder with a bounded memo cache
//!
//! Wraps an [`Embedder`] and memoizes vectors by normalized term text.
//! The cache is an optimization only: eviction triggers recomputation.

use std::sync::Arc;

use moka::sync::Cache;

use crate::embeddings::Embedder;
use crate::RagError;

pub struct QueryEncoder {
    embedder: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
    dimension: usize,
}

impl QueryEncoder {
    /// `dimension` must match the vectors stored in the index
    pub fn new(embedder: Arc<dyn Embedder>, capacity: u64, dimension: usize) -> Self {
        let cache = Cache::builder().max_capacity(capacity).build();
        Self {
            embedder,
            cache,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// One vector per term; cache misses are embedded in a single batch
    pub async fn encode_terms(&self, terms: &[String]) -> Result<Vec<Arc<Vec<f32>>>, RagError> {
        if terms.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let mut vectors: Vec<Option<Arc<Vec<f32>>>> =
            terms.iter().map(|t| self.cache.get(t.as_str())).collect();

        let missing: Vec<String> = terms
            .iter()
            .zip(vectors.iter())
            .filter(|(_, v)| v.is_none())
            .map(|(t, _)| t.clone())
            .collect();

        if !missing.is_empty() {
            tracing::debug!(
                hits = terms.len() - missing.len(),
                misses = missing.len(),
                model = self.embedder.model_name(),
                "Encoding query terms"
            );
            let embedded = self.embedder.embed_batch(&missing).await?;
            if embedded.len() != missing.len() {
                return Err(RagError::Embedding(format!(
                    "Expected {} vectors, got {}",
                    missing.len(),
                    embedded.len()
                )));
            }

            let mut fresh = missing.into_iter().zip(embedded);
            for slot in vectors.iter_mut().filter(|v| v.is_none()) {
                if let Some((term, vector)) = fresh.next() {
                    if vector.len() != self.dimension {
                        return Err(RagError::Embedding(format!(
                            "Embedding dimension mismatch: expected {}, got {}",
                            self.dimension,
                            vector.len()
                        )));
                    }
                    let vector = Arc::new(vector);
                    self.cache.insert(term, vector.clone());
                    *slot = Some(vector);
                }
            }
        }

        Ok(vectors.into_iter().flatten().collect())
    }

    /// Componentwise mean of the term vectors
    pub async fn encode_mean(&self, terms: &[String]) -> Result<Vec<f32>, RagError> {
        let vectors = self.encode_terms(terms).await?;
        Ok(mean_pool(&vectors))
    }
}

/// Componentwise mean; empty input yields an empty vector
pub fn mean_pool(vectors: &[Arc<Vec<f32>>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += *x;
        }
    }
    let n = vectors.len() as f32;
    sum.iter_mut().for_each(|x| *x /= n);
    sum
}
