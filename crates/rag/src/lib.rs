//! Retrieval for run club activity questions
//!
//! Features:
//! - Query normalization (month names, distance units)
//! - Bounded query expansion for distance-denominated questions
//! - Embedding encoder with a bounded memo cache and mean pooling
//! - Dense candidate retrieval via Qdrant with distance/time/subject filters
//! - Hybrid scoring (vector distance plus distance-mismatch penalty)
//! - Cross-encoder reranking that disables itself after the first failure
//! - Core `Retriever` trait implementation

pub mod candidates;
pub mod embeddings;
pub mod encoder;
pub mod hybrid;
pub mod memory_index;
pub mod normalizer;
pub mod ollama_embeddings;
pub mod query_expansion;
pub mod reranker;
pub mod retriever;
pub mod vector_store;

pub use candidates::{merge_candidates, CandidateRetriever};
pub use embeddings::{embedder_from_settings, Embedder, OpenAiCompatEmbedder, OpenAiEmbeddingConfig};
pub use encoder::{mean_pool, QueryEncoder};
pub use hybrid::HybridScorer;
pub use memory_index::InMemoryIndex;
pub use normalizer::{parse_distance_km, QueryNormalizer};
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use query_expansion::{QueryExpander, QueryExpansionConfig};
pub use reranker::{CrossEncoder, HttpCrossEncoder, Reranker, RerankerConfig};
pub use retriever::{HybridRetriever, RetrieverConfig};
pub use vector_store::{
    CandidateFilter, QdrantStore, ScoredRecord, VectorDistance, VectorIndex, VectorStoreConfig,
};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Empty query")]
    EmptyQuery,

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector store is empty")]
    EmptyStore,

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker unavailable: {0}")]
    RerankerUnavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl RagError {
    /// Errors that should degrade to "no context" rather than fail the request
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RagError::EmptyQuery
                | RagError::EmptyStore
                | RagError::EncoderUnavailable(_)
                | RagError::Embedding(_)
                | RagError::StoreUnavailable(_)
                | RagError::Connection(_)
        )
    }
}

impl From<RagError> for runclub_core::Error {
    fn from(err: RagError) -> Self {
        runclub_core::Error::Rag(err.to_string())
    }
}
