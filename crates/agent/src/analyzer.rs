//! Question analysis
//!
//! Turns a raw question into a [`Query`]: normalized text, intent, target
//! distance, month/year, relative time window and named subjects.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use runclub_core::{month_from_word, Query, TimeWindow, MONTH_NAMES};
use runclub_rag::{parse_distance_km, QueryNormalizer};

use crate::entities::{SubjectMatcher, MAX_SUBJECTS};
use crate::intent::{IntentClassifier, RuleBasedClassifier};

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid regex"));

static MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", MONTH_NAMES.join("|"))).expect("valid regex")
});

/// Relative period phrases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativePeriod {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    ThisYear,
}

impl RelativePeriod {
    const PHRASES: [(&'static str, RelativePeriod); 5] = [
        ("hari ini", RelativePeriod::Today),
        ("kemarin", RelativePeriod::Yesterday),
        ("minggu ini", RelativePeriod::ThisWeek),
        ("bulan ini", RelativePeriod::ThisMonth),
        ("tahun ini", RelativePeriod::ThisYear),
    ];

    pub fn detect(text: &str) -> Option<Self> {
        let text = text.to_lowercase();
        Self::PHRASES
            .iter()
            .find(|(phrase, _)| text.contains(phrase))
            .map(|(_, period)| *period)
    }

    /// Half-open window relative to `now` (UTC calendar)
    pub fn window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        let today = now.date_naive();
        match self {
            RelativePeriod::Today => Some(TimeWindow::day(today)),
            RelativePeriod::Yesterday => Some(TimeWindow::day(today - Duration::days(1))),
            RelativePeriod::ThisWeek => Some(TimeWindow::week_of(today)),
            RelativePeriod::ThisMonth => TimeWindow::month(today.year(), today.month()),
            RelativePeriod::ThisYear => TimeWindow::year(today.year()),
        }
    }
}

pub struct QueryAnalyzer {
    normalizer: QueryNormalizer,
    classifier: Arc<dyn IntentClassifier>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(RuleBasedClassifier::new()))
    }
}

impl QueryAnalyzer {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self {
            normalizer: QueryNormalizer::new(),
            classifier,
        }
    }

    pub fn classifier(&self) -> &Arc<dyn IntentClassifier> {
        &self.classifier
    }

    /// Analyze `question` against the known subjects at time `now`
    pub fn analyze(&self, question: &str, subjects: &SubjectMatcher, now: DateTime<Utc>) -> Query {
        let normalized = self.normalizer.normalize(question);
        let intent = self.classifier.classify(&normalized);
        let named = subjects.find(question, MAX_SUBJECTS);

        // month words are read with subject names masked out
        let residual = self
            .normalizer
            .normalize(&SubjectMatcher::mask(question, &named));

        let mut query = Query::new(question)
            .with_normalized(normalized.clone())
            .with_intent(intent);
        query.target_km = parse_distance_km(&normalized);
        query.subjects = named;
        query.month = MONTH_NAME
            .captures(&residual)
            .and_then(|c| month_from_word(&c[1]));
        query.year = YEAR
            .captures(&residual)
            .and_then(|c| c[1].parse::<i32>().ok());

        if let Some(period) = RelativePeriod::detect(&residual) {
            let today = now.date_naive();
            let explicit = query.month.is_some() || query.year.is_some();
            match period {
                RelativePeriod::ThisYear => {
                    query.year.get_or_insert(today.year());
                },
                RelativePeriod::ThisMonth if query.month.is_none() => {
                    query.month = Some(today.month());
                    query.year.get_or_insert(today.year());
                },
                // month/year literals outrank day and week phrases
                _ if !explicit => query.window = period.window(now),
                _ => {},
            }
        }
        query.resolve_window();

        tracing::debug!(
            intent = %query.intent,
            target_km = ?query.target_km,
            month = ?query.month,
            year = ?query.year,
            subjects = ?query.subjects,
            "Question analyzed"
        );

        query
    }
}
