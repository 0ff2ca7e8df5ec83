//! Candidate retrieval
//!
//! One nearest-neighbour query per query vector, filters pushed down to
//! the store, results merged by id keeping the lowest vector distance.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;

use runclub_core::CandidateRecord;

use crate::vector_store::{CandidateFilter, ScoredRecord, VectorIndex};
use crate::RagError;

pub struct CandidateRetriever {
    index: Arc<dyn VectorIndex>,
}

impl CandidateRetriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Merged candidates, ascending vector distance, at most `pool`
    pub async fn retrieve(
        &self,
        vectors: &[Arc<Vec<f32>>],
        filter: &CandidateFilter,
        pool: usize,
    ) -> Result<Vec<CandidateRecord>, RagError> {
        if vectors.is_empty() || pool == 0 {
            return Ok(Vec::new());
        }

        let batches = try_join_all(
            vectors
                .iter()
                .map(|v| self.index.query(v.as_slice(), pool, filter)),
        )
        .await?;

        let raw: usize = batches.iter().map(Vec::len).sum();
        let merged = merge_candidates(batches, pool);
        tracing::debug!(
            queries = vectors.len(),
            raw,
            merged = merged.len(),
            "Candidates retrieved"
        );
        metrics::histogram!("runclub_retrieval_candidates").record(merged.len() as f64);

        Ok(merged)
    }
}

/// Deduplicate by id keeping the minimum distance, sort ascending, truncate
///
/// Ties keep first-seen order.
pub fn merge_candidates(batches: Vec<Vec<ScoredRecord>>, pool: usize) -> Vec<CandidateRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, ScoredRecord> = HashMap::new();

    for hit in batches.into_iter().flatten() {
        match best.get_mut(&hit.record.id) {
            Some(existing) => {
                if hit.distance < existing.distance {
                    *existing = hit;
                }
            },
            None => {
                order.push(hit.record.id.clone());
                best.insert(hit.record.id.clone(), hit);
            },
        }
    }

    let mut merged: Vec<CandidateRecord> = order
        .into_iter()
        .filter_map(|id| best.remove(&id))
        .map(|hit| CandidateRecord::new(hit.record, hit.distance))
        .collect();

    merged.sort_by(|a, b| a.vector_distance.total_cmp(&b.vector_distance));
    merged.truncate(pool);
    merged
}
