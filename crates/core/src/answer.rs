//! Answer payload returned by the answer service

use serde::{Deserialize, Serialize};

use crate::calendar::TimeWindow;
use crate::query::Intent;
use crate::record::{CandidateRecord, RankedContext};

/// Provider tag for answers templated from computed facts
pub const PROVIDER_CALC: &str = "calc";
/// Provider tag for extractive answers built from context
pub const PROVIDER_FALLBACK: &str = "fallback";
/// Provider tag when no usable context exists
pub const PROVIDER_NONE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    #[default]
    Ok,
    Error,
}

/// Filters effectively applied after session backfill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilters {
    pub subjects: Vec<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub target_km: Option<f64>,
    pub window: Option<TimeWindow>,
}

/// One context item projected for the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub slot: usize,
    pub cited: bool,
    #[serde(flatten)]
    pub candidate: CandidateRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub status: AnswerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub question: String,
    pub answer: String,
    /// `<backend>:<model>`, `calc`, `fallback` or `none`
    pub provider: String,
    pub intent: Intent,
    pub filters: AppliedFilters,
    pub cited: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<String>,
    pub sources: Vec<Source>,
}

impl AnswerPayload {
    /// Error-shaped payload; the message is user-facing
    pub fn error(question: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: AnswerStatus::Error,
            answer: message.clone(),
            message: Some(message),
            question: question.into(),
            provider: PROVIDER_NONE.to_string(),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AnswerStatus::Ok
    }

    /// Project the context into sources, flagging cited slots
    pub fn with_sources(mut self, context: &RankedContext, cited: &[usize]) -> Self {
        self.sources = context
            .slots()
            .map(|(slot, c)| Source {
                slot,
                cited: cited.contains(&slot),
                candidate: c.clone(),
            })
            .collect();
        self
    }
}
