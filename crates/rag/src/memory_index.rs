//! In-process brute-force vector index
//!
//! Same contract as the Qdrant store, cosine distance. Used for tests and
//! for running without a Qdrant deployment.

use async_trait::async_trait;
use parking_lot::RwLock;

use runclub_core::StoredRecord;

use crate::vector_store::{CandidateFilter, ScoredRecord, VectorIndex};
use crate::RagError;

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<(StoredRecord, Vec<f32>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record by id
    pub fn upsert(&self, record: StoredRecord, vector: Vec<f32>) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|(r, _)| r.id == record.id) {
            *existing = (record, vector);
        } else {
            entries.push((record, vector));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<ScoredRecord>, RagError> {
        let entries = self.entries.read();
        let mut scored: Vec<ScoredRecord> = entries
            .iter()
            .filter(|(record, _)| filter.matches(record))
            .map(|(record, v)| ScoredRecord {
                record: record.clone(),
                distance: cosine_distance(vector, v),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<Vec<StoredRecord>, RagError> {
        let entries = self.entries.read();
        Ok(ids
            .iter()
            .filter_map(|id| entries.iter().find(|(r, _)| &r.id == id))
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn scroll_all(&self) -> Result<Vec<StoredRecord>, RagError> {
        Ok(self.entries.read().iter().map(|(r, _)| r.clone()).collect())
    }

    async fn count(&self) -> Result<u64, RagError> {
        Ok(self.entries.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = InMemoryIndex::new();
        let hits = index
            .query(&[1.0, 0.0], 10, &CandidateFilter::new())
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_filters() {
        let index = InMemoryIndex::new();
        index.upsert(StoredRecord::new("x", "x").with_distance_km(5.0), vec![1.0, 0.0]);
        index.upsert(StoredRecord::new("y", "y").with_distance_km(10.0), vec![0.7, 0.7]);
        index.upsert(StoredRecord::new("z", "z").with_distance_km(10.1), vec![0.0, 1.0]);

        let all = index.query(&[1.0, 0.0], 10, &CandidateFilter::new()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);

        let filtered = index
            .query(&[1.0, 0.0], 10, &CandidateFilter::new().distance_window(10.0, 0.3))
            .await
            .unwrap();
        let ids: Vec<&str> = filtered.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "z"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_get_by_id_skips_unknown() {
        let index = InMemoryIndex::new();
        index.upsert(StoredRecord::new("a", "old"), vec![1.0]);
        index.upsert(StoredRecord::new("a", "new"), vec![1.0]);
        assert_eq!(index.len(), 1);

        let found = index
            .get_by_id(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].summary, "new");
    }
}
