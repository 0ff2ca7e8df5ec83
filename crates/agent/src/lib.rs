//! Question answering over run club activity data
//!
//! Features:
//! - Rule-based intent classification behind a swappable trait
//! - Subject matching against the names present in the store
//! - Month/year and relative time-window extraction
//! - Deterministic totals, threshold checks and comparisons over log text
//! - Club leaderboard from a full store scan
//! - Session memory with lazy TTL expiry
//! - Grounded/guarded answer synthesis over the provider chain
//! - `AnswerService` tying the stages together

pub mod analyzer;
pub mod compute;
pub mod entities;
pub mod intent;
pub mod leaderboard;
pub mod service;
pub mod session_store;
pub mod synthesizer;

pub use analyzer::{QueryAnalyzer, RelativePeriod};
pub use compute::{first_at_least, parse_log, total_km, ComputationEngine, LogEntry, Period, SubjectLog};
pub use entities::{SubjectMatcher, MAX_SUBJECTS};
pub use intent::{IntentClassifier, IntentRule, RuleBasedClassifier};
pub use leaderboard::{
    aggregate, Leaderboard, LeaderboardRequest, LeaderboardScope, LeaderboardTable, StandingsFilter,
};
pub use service::{AnswerService, AskRequest};
pub use session_store::{Clock, InMemorySessionStore, ManualClock, SessionStore, SystemClock};
pub use synthesizer::{
    calc_answer, extractive_answer, parse_citations, suggestions, AnswerSynthesizer, Synthesis,
    NO_DATA_ANSWER,
};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// Nothing retrieved and nothing computed; answered with an explicit "no data" message
    #[error("No relevant context")]
    NoRelevantContext,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl From<runclub_rag::RagError> for AgentError {
    fn from(err: runclub_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}

impl From<runclub_llm::LlmError> for AgentError {
    fn from(err: runclub_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<runclub_core::Error> for AgentError {
    fn from(err: runclub_core::Error) -> Self {
        match err {
            runclub_core::Error::InvalidInput(m) => AgentError::InvalidInput(m),
            runclub_core::Error::Llm(m) => AgentError::Llm(m),
            other => AgentError::Retrieval(other.to_string()),
        }
    }
}

impl From<AgentError> for runclub_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::InvalidInput(m) => runclub_core::Error::InvalidInput(m),
            other => runclub_core::Error::Agent(other.to_string()),
        }
    }
}
