//! Intent classification
//!
//! An ordered rule table over the lower-cased question; the first rule whose
//! patterns all match decides the intent.

use once_cell::sync::Lazy;
use regex::Regex;

use runclub_core::Intent;

/// Classifier seam; callers only see this trait
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Intent;

    fn name(&self) -> &str;
}

/// One row of the rule table: every pattern must match
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub intent: Intent,
    pub patterns: Vec<Regex>,
}

impl IntentRule {
    pub fn new(intent: Intent, patterns: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            intent,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().all(|p| p.is_match(text))
    }
}

static DEFAULT_RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    let table: &[(Intent, &[&str])] = &[
        (
            Intent::Threshold,
            &[
                r"\bpernah\b|\bminimal\b|\blebih dari\b|>=|≥",
                r"\b\d+(?:[.,]\d+)?\s*(?:k|km)\b",
            ],
        ),
        (
            Intent::Total,
            &[r"\b(?:total|jumlah|akumulasi)\b|\bberapa\s*(?:km|kilometer)\b"],
        ),
        (
            Intent::Compare,
            &[r"\bbanding(?:kan)?\b|\bvs\b|\bcompare\b|\blebih\s+(?:jauh|banyak)\b|\bterjauh\b|\bpaling\s+jauh\b"],
        ),
        (Intent::Who, &[r"\bsiapa(?:\s+aja|\s+saja)?\b|\bwho\b"]),
        (Intent::Count, &[r"\bberapa\s+kali\b|\bcount\b"]),
        (Intent::Top, &[r"\b(?:tercepat|terlama|top)\b"]),
        (Intent::Trend, &[r"\b(?:tren|trend|minggu|bulan)\b"]),
    ];

    table
        .iter()
        .map(|(intent, patterns)| IntentRule::new(*intent, patterns).expect("valid regex"))
        .collect()
});

/// Rule-based classifier over a fixed, ordered table
#[derive(Debug, Clone)]
pub struct RuleBasedClassifier {
    rules: Vec<IntentRule>,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }

    pub fn with_rules(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    /// Insert a rule ahead of the existing ones
    pub fn prepend_rule(&mut self, rule: IntentRule) {
        self.rules.insert(0, rule);
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }
}

impl IntentClassifier for RuleBasedClassifier {
    fn classify(&self, text: &str) -> Intent {
        let text = text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.intent)
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Intent {
        RuleBasedClassifier::new().classify(text)
    }

    #[test]
    fn test_threshold_needs_distance() {
        assert_eq!(classify("Apakah Budi pernah lari 10 km?"), Intent::Threshold);
        assert_eq!(classify("budi minimal 5k bulan ini?"), Intent::Threshold);
        assert_eq!(classify("lari >= 21 km siapa"), Intent::Threshold);
        // no distance, so not a threshold question
        assert_ne!(classify("budi pernah lari?"), Intent::Threshold);
    }

    #[test]
    fn test_total() {
        assert_eq!(classify("total jarak Budi bulan januari"), Intent::Total);
        assert_eq!(classify("berapa km Sari lari?"), Intent::Total);
        assert_eq!(classify("berapa kilometer sari"), Intent::Total);
    }

    #[test]
    fn test_compare_and_superlatives() {
        assert_eq!(classify("bandingkan Budi vs Sari"), Intent::Compare);
        assert_eq!(classify("siapa yang paling jauh?"), Intent::Compare);
        assert_eq!(classify("siapa terjauh tahun ini"), Intent::Compare);
    }

    #[test]
    fn test_remaining_intents() {
        assert_eq!(classify("siapa saja yang lari 5 km"), Intent::Who);
        assert_eq!(classify("berapa kali Sari lari"), Intent::Count);
        assert_eq!(classify("pace tercepat"), Intent::Top);
        assert_eq!(classify("tren lari minggu ini"), Intent::Trend);
        assert_eq!(classify("halo!"), Intent::Generic);
    }

    #[test]
    fn test_order_first_match_wins() {
        // "total" outranks "siapa"
        assert_eq!(classify("siapa total larinya paling banyak"), Intent::Total);
    }

    #[test]
    fn test_prepended_rule() {
        let mut classifier = RuleBasedClassifier::new();
        classifier.prepend_rule(IntentRule::new(Intent::Top, &[r"\bjuara\b"]).unwrap());
        assert_eq!(classifier.classify("siapa juara bulan ini"), Intent::Top);
    }
}
