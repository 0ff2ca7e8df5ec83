//! Core traits and types for the run club question answering engine
//!
//! This crate provides foundational types used across all other crates:
//! - Query, intent and time-window types
//! - Candidate records and ranked context
//! - Computed facts and leaderboard standings
//! - Answer payload returned to callers
//! - Session state shared between follow-up questions
//! - The `Retriever` trait implemented by the rag crate
//! - Error types

pub mod answer;
pub mod calendar;
pub mod error;
pub mod facts;
pub mod query;
pub mod record;
pub mod session;
pub mod traits;

pub use answer::{AnswerPayload, AnswerStatus, AppliedFilters, Source, PROVIDER_CALC, PROVIDER_FALLBACK, PROVIDER_NONE};
pub use calendar::{month_from_word, month_name, TimeWindow, MONTH_NAMES};
pub use error::{Error, Result};
pub use facts::{Fact, FactKind, FactSheet, Standing};
pub use query::{Intent, Query};
pub use record::{CandidateRecord, RankedContext, StoredRecord};
pub use session::SessionState;
pub use traits::{RetrieveOptions, Retriever};
