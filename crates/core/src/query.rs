//! Query and intent types

use serde::{Deserialize, Serialize};

use crate::calendar::TimeWindow;

/// Classified purpose of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    Generic,
    Total,
    Threshold,
    Compare,
    Who,
    Count,
    Top,
    Trend,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Total => "total",
            Self::Threshold => "threshold",
            Self::Compare => "compare",
            Self::Who => "who",
            Self::Count => "count",
            Self::Top => "top",
            Self::Trend => "trend",
        }
    }

    /// Intents whose answer must be grounded in computed facts
    pub fn needs_facts(&self) -> bool {
        matches!(self, Self::Total | Self::Threshold | Self::Compare)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question after normalization and rule-based analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// Text as received
    pub raw: String,
    /// Normalized text used for retrieval
    pub normalized: String,
    /// Distance mentioned in the question, in km
    pub target_km: Option<f64>,
    /// Explicit or relative time window
    pub window: Option<TimeWindow>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub intent: Intent,
    /// Zero, one or two resolved subject names
    pub subjects: Vec<String>,
}

impl Query {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            normalized: raw.clone(),
            raw,
            ..Default::default()
        }
    }

    pub fn with_normalized(mut self, normalized: impl Into<String>) -> Self {
        self.normalized = normalized.into();
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_target_km(mut self, km: f64) -> Self {
        self.target_km = Some(km);
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    /// First resolved subject
    pub fn subject(&self) -> Option<&str> {
        self.subjects.first().map(String::as_str)
    }

    /// Rebuild the time window from month/year when no relative window was given
    pub fn resolve_window(&mut self) {
        if self.window.is_some() {
            return;
        }
        self.window = match (self.year, self.month) {
            (Some(y), Some(m)) => TimeWindow::month(y, m),
            (Some(y), None) => TimeWindow::year(y),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_facts() {
        assert!(Intent::Total.needs_facts());
        assert!(Intent::Compare.needs_facts());
        assert!(!Intent::Who.needs_facts());
        assert!(!Intent::Generic.needs_facts());
    }

    #[test]
    fn test_resolve_window_from_month_and_year() {
        let mut query = Query::new("total januari 2025");
        query.month = Some(1);
        query.year = Some(2025);
        query.resolve_window();
        assert_eq!(query.window, TimeWindow::month(2025, 1));

        // month without year stays unresolved; text filters still apply
        let mut query = Query::new("total januari");
        query.month = Some(1);
        query.resolve_window();
        assert!(query.window.is_none());
    }
}
