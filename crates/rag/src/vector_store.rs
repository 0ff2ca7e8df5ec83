//! Vector store seam and the Qdrant implementation
//!
//! Payload layout of a stored point:
//! - `text`: summary of one activity or one member's aggregated log
//! - `member_name`: subject the record belongs to
//! - `distance_km`: activity distance (absent on aggregated logs)
//! - `activity_ts`: activity start in epoch seconds (absent on aggregated logs)

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, Condition, CountPointsBuilder, Filter,
        GetPointsBuilder, PointId, Range, ScrollPointsBuilder, SearchPointsBuilder, Value,
    },
    Qdrant,
};

use runclub_config::constants::{endpoints, rag};
use runclub_config::VectorStoreSettings;
use runclub_core::{StoredRecord, TimeWindow};

use crate::RagError;

const FIELD_TEXT: &str = "text";
const FIELD_MEMBER: &str = "member_name";
const FIELD_DISTANCE: &str = "distance_km";
const FIELD_TIMESTAMP: &str = "activity_ts";

const SCROLL_PAGE: u32 = 256;

/// A stored record with its distance to the query vector (lower is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub distance: f32,
}

/// Structured predicate pushed down to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilter {
    /// Match any of these subjects
    pub subjects: Vec<String>,
    /// Inclusive km range; records without a distance never match
    pub distance_range: Option<(f64, f64)>,
    /// Half-open window on `activity_ts`; records without a timestamp pass
    pub window: Option<TimeWindow>,
}

impl CandidateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subjects(mut self, subjects: &[String]) -> Self {
        self.subjects = subjects.to_vec();
        self
    }

    /// `[target - tolerance, target + tolerance]`, floored at zero
    pub fn distance_window(mut self, target_km: f64, tolerance_km: f64) -> Self {
        self.distance_range = Some(((target_km - tolerance_km).max(0.0), target_km + tolerance_km));
        self
    }

    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.distance_range.is_none() && self.window.is_none()
    }

    /// Client-side evaluation, same semantics as the pushed-down filter
    pub fn matches(&self, record: &StoredRecord) -> bool {
        if !self.subjects.is_empty() {
            let Some(subject) = record.subject.as_deref() else {
                return false;
            };
            if !self.subjects.iter().any(|s| s.eq_ignore_ascii_case(subject)) {
                return false;
            }
        }

        if let Some((lo, hi)) = self.distance_range {
            match record.distance_km {
                Some(km) if km >= lo && km <= hi => {},
                _ => return false,
            }
        }

        if let Some(window) = self.window {
            if let Some(ts) = record.activity_ts {
                if ts < window.start_epoch() || ts >= window.end_epoch() {
                    return false;
                }
            }
        }

        true
    }

    fn into_qdrant(self) -> Option<Filter> {
        if self.is_empty() {
            return None;
        }

        let mut must: Vec<Condition> = Vec::new();

        if !self.subjects.is_empty() {
            must.push(Condition::matches(FIELD_MEMBER, self.subjects));
        }

        if let Some((lo, hi)) = self.distance_range {
            must.push(Condition::range(
                FIELD_DISTANCE,
                Range {
                    gte: Some(lo),
                    lte: Some(hi),
                    ..Default::default()
                },
            ));
        }

        if let Some(window) = self.window {
            let in_window = Condition::range(
                FIELD_TIMESTAMP,
                Range {
                    gte: Some(window.start_epoch() as f64),
                    lt: Some(window.end_epoch() as f64),
                    ..Default::default()
                },
            );
            let undated = Condition::is_empty(FIELD_TIMESTAMP);
            must.push(Filter::should([in_window, undated]).into());
        }

        Some(Filter::must(must))
    }
}

/// Consumed vector store interface
///
/// An empty store yields empty results, never an error.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `vector`, ascending distance
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<ScoredRecord>, RagError>;

    /// Records with the given ids; unknown ids are skipped
    async fn get_by_id(&self, ids: &[String]) -> Result<Vec<StoredRecord>, RagError>;

    /// Every stored record
    async fn scroll_all(&self) -> Result<Vec<StoredRecord>, RagError>;

    async fn count(&self) -> Result<u64, RagError>;
}

/// Distance metric the collection was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    DotProduct,
}

impl VectorDistance {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dot" | "dotproduct" | "ip" => Self::DotProduct,
            "euclid" | "euclidean" | "l2" => Self::Euclidean,
            _ => Self::Cosine,
        }
    }

    /// Convert a Qdrant score into a distance where lower is closer
    pub fn score_to_distance(&self, score: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - score,
            Self::DotProduct => -score,
            Self::Euclidean => score,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub distance: VectorDistance,
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: rag::COLLECTION.to_string(),
            distance: VectorDistance::Cosine,
            api_key: None,
        }
    }
}

impl From<&VectorStoreSettings> for VectorStoreConfig {
    fn from(settings: &VectorStoreSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            collection: settings.collection.clone(),
            distance: VectorDistance::parse(&settings.distance),
            api_key: settings.api_key.clone(),
        }
    }
}

/// Qdrant-backed store
pub struct QdrantStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn is_missing_collection(err: &impl std::fmt::Display) -> bool {
        let msg = err.to_string().to_lowercase();
        msg.contains("not found") || msg.contains("doesn't exist")
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &CandidateFilter,
    ) -> Result<Vec<ScoredRecord>, RagError> {
        let mut search = SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), k as u64)
            .with_payload(true);

        if let Some(f) = filter.clone().into_qdrant() {
            search = search.filter(f);
        }

        let response = match self.client.search_points(search).await {
            Ok(response) => response,
            Err(e) if Self::is_missing_collection(&e) => {
                tracing::debug!(collection = %self.config.collection, "Collection missing, treating as empty");
                return Ok(Vec::new());
            },
            Err(e) => return Err(RagError::StoreUnavailable(e.to_string())),
        };

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                distance: self.config.distance.score_to_distance(point.score),
                record: record_from_payload(point_id_to_string(point.id), point.payload),
            })
            .collect())
    }

    async fn get_by_id(&self, ids: &[String]) -> Result<Vec<StoredRecord>, RagError> {
        let point_ids: Vec<PointId> = ids.iter().filter_map(|id| parse_point_id(id)).collect();
        if point_ids.is_empty() {
            return Ok(Vec::new());
        }

        let response = match self
            .client
            .get_points(GetPointsBuilder::new(&self.config.collection, point_ids).with_payload(true))
            .await
        {
            Ok(response) => response,
            Err(e) if Self::is_missing_collection(&e) => return Ok(Vec::new()),
            Err(e) => return Err(RagError::StoreUnavailable(e.to_string())),
        };

        Ok(response
            .result
            .into_iter()
            .map(|point| record_from_payload(point_id_to_string(point.id), point.payload))
            .collect())
    }

    async fn scroll_all(&self) -> Result<Vec<StoredRecord>, RagError> {
        let mut records = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut scroll = ScrollPointsBuilder::new(&self.config.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(o) = offset.take() {
                scroll = scroll.offset(o);
            }

            let page = match self.client.scroll(scroll).await {
                Ok(page) => page,
                Err(e) if Self::is_missing_collection(&e) => return Ok(records),
                Err(e) => return Err(RagError::StoreUnavailable(e.to_string())),
            };

            records.extend(
                page.result
                    .into_iter()
                    .map(|point| record_from_payload(point_id_to_string(point.id), point.payload)),
            );

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn count(&self) -> Result<u64, RagError> {
        match self
            .client
            .count(CountPointsBuilder::new(&self.config.collection).exact(true))
            .await
        {
            Ok(response) => Ok(response.result.map(|r| r.count).unwrap_or(0)),
            Err(e) if Self::is_missing_collection(&e) => Ok(0),
            Err(e) => Err(RagError::StoreUnavailable(e.to_string())),
        }
    }
}

fn parse_point_id(id: &str) -> Option<PointId> {
    if let Ok(n) = id.parse::<u64>() {
        return Some(PointId::from(n));
    }
    // Qdrant only accepts UUID or integer ids
    let looks_like_uuid = id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4;
    looks_like_uuid.then(|| PointId::from(id.to_string()))
}

fn point_id_to_string(id: Option<PointId>) -> String {
    id.and_then(|pid| pid.point_id_options)
        .map(|opts| match opts {
            PointIdOptions::Uuid(u) => u,
            PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default()
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value.kind.as_ref()? {
        Kind::DoubleValue(d) => Some(*d),
        Kind::IntegerValue(i) => Some(*i as f64),
        Kind::StringValue(s) => s.replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: Value) -> Option<String> {
    match value.kind? {
        Kind::StringValue(s) => Some(s),
        _ => None,
    }
}

fn record_from_payload(id: String, mut payload: HashMap<String, Value>) -> StoredRecord {
    let summary = payload
        .remove(FIELD_TEXT)
        .and_then(value_as_string)
        .unwrap_or_default();

    StoredRecord {
        id,
        summary,
        subject: payload.remove(FIELD_MEMBER).and_then(value_as_string),
        distance_km: payload.get(FIELD_DISTANCE).and_then(value_as_f64),
        activity_ts: payload
            .get(FIELD_TIMESTAMP)
            .and_then(value_as_f64)
            .map(|ts| ts as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_value(s: &str) -> Value {
        Value {
            kind: Some(Kind::StringValue(s.to_string())),
        }
    }

    #[test]
    fn test_score_to_distance() {
        assert!((VectorDistance::Cosine.score_to_distance(0.8) - 0.2).abs() < 1e-6);
        assert_eq!(VectorDistance::DotProduct.score_to_distance(3.0), -3.0);
        assert_eq!(VectorDistance::Euclidean.score_to_distance(1.5), 1.5);
        assert_eq!(VectorDistance::parse("Dot"), VectorDistance::DotProduct);
        assert_eq!(VectorDistance::parse("anything"), VectorDistance::Cosine);
    }

    #[test]
    fn test_record_from_payload() {
        let mut payload = HashMap::new();
        payload.insert(FIELD_TEXT.to_string(), string_value("Budi lari 5 km"));
        payload.insert(FIELD_MEMBER.to_string(), string_value("Budi"));
        payload.insert(
            FIELD_DISTANCE.to_string(),
            Value {
                kind: Some(Kind::DoubleValue(5.02)),
            },
        );
        payload.insert(
            FIELD_TIMESTAMP.to_string(),
            Value {
                kind: Some(Kind::IntegerValue(1_736_035_200)),
            },
        );

        let record = record_from_payload("42".into(), payload);
        assert_eq!(record.summary, "Budi lari 5 km");
        assert_eq!(record.subject.as_deref(), Some("Budi"));
        assert_eq!(record.distance_km, Some(5.02));
        assert_eq!(record.activity_ts, Some(1_736_035_200));
    }

    #[test]
    fn test_parse_point_id() {
        assert!(parse_point_id("17").is_some());
        assert!(parse_point_id(&StoredRecord::subject_record_id("Budi")).is_some());
        assert!(parse_point_id("not-an-id").is_none());
    }

    #[test]
    fn test_filter_matches_distance_window() {
        let filter = CandidateFilter::new().distance_window(10.0, 0.3);
        let near = StoredRecord::new("a", "").with_distance_km(10.2);
        let far = StoredRecord::new("b", "").with_distance_km(10.5);
        let aggregated = StoredRecord::new("c", "");
        assert!(filter.matches(&near));
        assert!(!filter.matches(&far));
        assert!(!filter.matches(&aggregated));
    }

    #[test]
    fn test_filter_time_window_is_half_open_and_passes_undated() {
        let window = TimeWindow::month(2025, 1).unwrap();
        let filter = CandidateFilter::new().time_window(window);
        let start = StoredRecord::new("a", "").with_activity_ts(window.start_epoch());
        let end = StoredRecord::new("b", "").with_activity_ts(window.end_epoch());
        let undated = StoredRecord::new("c", "");
        assert!(filter.matches(&start));
        assert!(!filter.matches(&end));
        assert!(filter.matches(&undated));
    }

    #[test]
    fn test_filter_subjects_case_insensitive() {
        let filter = CandidateFilter::new().subjects(&["Budi".to_string()]);
        assert!(filter.matches(&StoredRecord::new("a", "").with_subject("budi")));
        assert!(!filter.matches(&StoredRecord::new("b", "").with_subject("Sari")));
        assert!(!filter.matches(&StoredRecord::new("c", "")));
    }

    #[test]
    fn test_empty_filter_pushes_nothing() {
        assert!(CandidateFilter::new().into_qdrant().is_none());
        let filter = CandidateFilter::new()
            .subjects(&["Budi".to_string()])
            .distance_window(5.0, 0.3);
        let qdrant = filter.into_qdrant().unwrap();
        assert_eq!(qdrant.must.len(), 2);
    }
}
