//! Retrieval trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::query::Query;
use crate::record::RankedContext;
use crate::Result;

/// Retriever interface
///
/// Implementations turn an analyzed [`Query`] into a ranked context. An
/// empty store or an over-restrictive filter yields an empty context, not
/// an error.
///
/// ```ignore
/// let options = RetrieveOptions::default().with_top_k(5);
/// let context = retriever.retrieve(&query, &options).await?;
/// for (slot, candidate) in context.slots() {
///     println!("[{}] {}", slot, candidate.summary());
/// }
/// ```
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    async fn retrieve(&self, query: &Query, options: &RetrieveOptions) -> Result<RankedContext>;

    /// Retriever name for logging
    fn name(&self) -> &str;
}

/// Retrieval options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Number of records to return
    pub top_k: usize,
    /// Candidates gathered before ranking
    pub candidate_pool: usize,
    /// Apply the cross-encoder stage when available
    #[serde(default = "default_true")]
    pub rerank: bool,
    /// Restrict candidates to the query's subjects
    #[serde(default = "default_true")]
    pub filter_subjects: bool,
    /// Constrain candidates to a window around the query distance
    #[serde(default = "default_true")]
    pub distance_window: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            candidate_pool: 80,
            rerank: true,
            filter_subjects: true,
            distance_window: true,
        }
    }
}

impl RetrieveOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_candidate_pool(mut self, pool: usize) -> Self {
        self.candidate_pool = pool;
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_distance_window(mut self, enabled: bool) -> Self {
        self.distance_window = enabled;
        self
    }

    pub fn with_subject_filter(mut self, enabled: bool) -> Self {
        self.filter_subjects = enabled;
        self
    }
}
