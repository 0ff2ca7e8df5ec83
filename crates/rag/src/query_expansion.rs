//! Query expansion for distance-denominated questions
//!
//! The embedding model is sensitive to the surface form of numeric
//! distances, so a question about "10 km" is also searched as "10k" and
//! "10000 meter". Output is deterministic and capped.

use std::collections::HashSet;

use runclub_config::RagConfig;

/// Expansion configuration
#[derive(Debug, Clone)]
pub struct QueryExpansionConfig {
    /// Maximum number of terms, original included
    pub max_terms: usize,
    /// Domain synonyms appended after unit variants
    pub synonyms: Vec<String>,
}

impl Default for QueryExpansionConfig {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for QueryExpansionConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            max_terms: config.max_expansions,
            synonyms: config.synonyms.clone(),
        }
    }
}

/// Formats km without trailing zeros: 10.0 -> "10", 5.50 -> "5.5"
pub(crate) fn format_km(km: f64) -> String {
    let s = format!("{:.2}", km);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[derive(Debug, Clone, Default)]
pub struct QueryExpander {
    config: QueryExpansionConfig,
}

impl QueryExpander {
    pub fn new(config: QueryExpansionConfig) -> Self {
        Self { config }
    }

    /// Ordered, de-duplicated variants of `normalized`
    ///
    /// Order: the original, unit variants when a distance was detected,
    /// then synonyms. Empty input yields no terms.
    pub fn expand(&self, normalized: &str, target_km: Option<f64>) -> Vec<String> {
        let original = normalized.trim();
        if original.is_empty() {
            return Vec::new();
        }

        let mut candidates = vec![original.to_string()];

        if let Some(km) = target_km.filter(|km| *km > 0.0) {
            let v = format_km(km);
            let meters = (km * 1000.0).round() as i64;
            candidates.push(format!("{} km", v));
            candidates.push(format!("{}k", v));
            candidates.push(format!("{} meter", meters));
            candidates.push(format!("lari {} km", v));
        }

        candidates.extend(self.config.synonyms.iter().cloned());

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .take(self.config.max_terms)
            .collect()
    }
}
