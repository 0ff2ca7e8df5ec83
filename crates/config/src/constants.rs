//! Centralized constants
//!
//! Single source of truth for default endpoints, retrieval tunables and
//! timeouts. Settings defaults read from here.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama endpoint, used for embeddings and the local LLM backend
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant endpoint (gRPC port)
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Cross-encoder rerank service (TEI-compatible `/rerank`)
    pub const RERANKER_DEFAULT: &str = "http://127.0.0.1:8081";

    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";

    /// Groq exposes an OpenAI-compatible API
    pub const GROQ_DEFAULT: &str = "https://api.groq.com/openai/v1";

    pub const ANTHROPIC_DEFAULT: &str = "https://api.anthropic.com";
}

/// Timeouts (milliseconds)
pub mod timeouts {
    pub const LLM_REQUEST_MS: u64 = 30_000;

    pub const EMBEDDING_MS: u64 = 10_000;

    pub const RERANK_MS: u64 = 10_000;

    /// Whole-request budget enforced by the HTTP layer
    pub const HTTP_REQUEST_SECS: u64 = 60;
}

/// Retrieval and ranking defaults
pub mod rag {
    /// Candidates gathered before hybrid scoring and reranking
    pub const CANDIDATE_POOL: usize = 80;

    /// Context size for conversational answers
    pub const DEFAULT_TOP_K: usize = 5;

    /// Context size for bulk question answering
    pub const QA_TOP_K: usize = 50;

    /// Upper bound accepted from callers
    pub const MAX_TOP_K: usize = 50;

    /// Weight of the distance-mismatch penalty in the hybrid score
    pub const ALPHA_KM: f64 = 0.6;

    /// Half-width of the distance window pushed to the store
    pub const DISTANCE_TOLERANCE_KM: f64 = 0.3;

    pub const MAX_EXPANSIONS: usize = 6;

    pub const ENCODER_CACHE_CAPACITY: u64 = 256;

    pub const EMBEDDING_DIM: usize = 768;

    pub const COLLECTION: &str = "runclub_activities";
}

/// LLM defaults
pub mod llm {
    pub const TEMPERATURE: f32 = 0.2;

    pub const MAX_TOKENS: u32 = 512;

    /// Context characters rendered into a prompt
    pub const MAX_CONTEXT_CHARS: usize = 8000;

    pub const GROQ_MODEL: &str = "llama-3.1-8b-instant";

    pub const OPENAI_MODEL: &str = "gpt-4o-mini";

    pub const OLLAMA_MODEL: &str = "llama3.1:8b";

    pub const CLAUDE_MODEL: &str = "claude-3-5-haiku-latest";
}

/// Session memory
pub mod session {
    pub const TTL_SECS: u64 = 3600;

    pub const DEFAULT_SESSION_ID: &str = "default";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_defaults_consistent() {
        assert!(rag::CANDIDATE_POOL >= rag::QA_TOP_K);
        assert!(rag::DEFAULT_TOP_K <= rag::MAX_TOP_K);
        assert!(rag::ALPHA_KM >= 0.0);
        assert!(rag::MAX_EXPANSIONS <= 6);
    }
}
