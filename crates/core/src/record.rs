//! Candidate records and ranked context

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record as stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    /// Natural-language summary of one activity or one subject's log
    pub summary: String,
    /// Subject (club member) the record belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    /// Activity start, epoch seconds; absent on aggregated records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_ts: Option<i64>,
}

impl StoredRecord {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            subject: None,
            distance_km: None,
            activity_ts: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_distance_km(mut self, km: f64) -> Self {
        self.distance_km = Some(km);
        self
    }

    pub fn with_activity_ts(mut self, ts: i64) -> Self {
        self.activity_ts = Some(ts);
        self
    }

    /// Stable id of a subject's aggregated log record
    pub fn subject_record_id(subject: &str) -> String {
        let name = format!("runclub:subject:{}", subject.trim().to_lowercase());
        Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
    }
}

/// A stored record plus the scores gathered during one retrieval call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    #[serde(flatten)]
    pub record: StoredRecord,
    /// Distance to the query vector, lower is closer
    pub vector_distance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_encoder_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
}

impl CandidateRecord {
    pub fn new(record: StoredRecord, vector_distance: f32) -> Self {
        Self {
            record,
            vector_distance,
            cross_encoder_score: None,
            hybrid_score: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn summary(&self) -> &str {
        &self.record.summary
    }

    pub fn subject(&self) -> Option<&str> {
        self.record.subject.as_deref()
    }

    /// Hybrid score when computed, else the raw vector distance
    pub fn hybrid_or_vector(&self) -> f32 {
        self.hybrid_score.unwrap_or(self.vector_distance)
    }
}

/// Ordered context handed to computation and synthesis
///
/// Slots are 1-based, matching the `[n]` markers used in prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankedContext {
    items: Vec<CandidateRecord>,
}

impl RankedContext {
    pub fn new(items: Vec<CandidateRecord>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.items.iter()
    }

    /// Iterate with 1-based slot numbers
    pub fn slots(&self) -> impl Iterator<Item = (usize, &CandidateRecord)> {
        self.items.iter().enumerate().map(|(i, c)| (i + 1, c))
    }

    pub fn slot(&self, slot: usize) -> Option<&CandidateRecord> {
        slot.checked_sub(1).and_then(|i| self.items.get(i))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|c| c.id() == id)
    }

    /// Append a record, returning its slot
    pub fn push(&mut self, candidate: CandidateRecord) -> usize {
        self.items.push(candidate);
        self.items.len()
    }

    /// Slot of the first record belonging to `subject`, preferring aggregated logs
    pub fn slot_for_subject(&self, subject: &str) -> Option<usize> {
        let subject = subject.to_lowercase();
        let belongs = |c: &CandidateRecord| {
            c.subject()
                .map(|s| s.to_lowercase() == subject)
                .unwrap_or(false)
        };
        self.slots()
            .find(|(_, c)| belongs(c) && c.record.activity_ts.is_none())
            .or_else(|| self.slots().find(|(_, c)| belongs(c)))
            .map(|(slot, _)| slot)
    }

    pub fn into_inner(self) -> Vec<CandidateRecord> {
        self.items
    }
}
