//! Query normalization
//!
//! Collapses whitespace, rewrites numeric month references (`bulan 9`) and
//! month abbreviations (`okt`) to full Indonesian month names, and
//! canonicalizes distance units so that `10km`, `10 kms` and
//! `10 kilometer` all read `10 km`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use runclub_core::calendar::{month_from_word, month_name};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

static NUMERIC_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:bulan|bln)\s*(1[0-2]|0?[1-9])\b").expect("valid regex")
});

static MONTH_ABBREVIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|jun|jul|agu|agt|sept|sep|okt|nov|des)\b\.?")
        .expect("valid regex")
});

static KM_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:kilometers?|kilometres?|kms?)\b").expect("valid regex")
});

static KM_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:km|kilometers?|kilometres?)\b").expect("valid regex")
});

static K_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*k\b").expect("valid regex"));

static METER_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(?:m|meters?|metres?|meter)\b").expect("valid regex")
});

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

/// Distance mentioned in `text`, in km
///
/// Tries `N km`, then `Nk`, then `N m` (converted from meters).
pub fn parse_distance_km(text: &str) -> Option<f64> {
    if let Some(c) = KM_VALUE.captures(text) {
        return parse_number(&c[1]);
    }
    if let Some(c) = K_VALUE.captures(text) {
        return parse_number(&c[1]);
    }
    METER_VALUE
        .captures(text)
        .and_then(|c| parse_number(&c[1]))
        .map(|m| m / 1000.0)
}

/// Stateless query normalizer
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryNormalizer;

impl QueryNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize raw question text; empty input yields empty output
    pub fn normalize(&self, raw: &str) -> String {
        let text = WHITESPACE.replace_all(raw.trim(), " ");

        let text = NUMERIC_MONTH.replace_all(&text, |c: &Captures| {
            c[1].parse::<u32>()
                .ok()
                .and_then(month_name)
                .map(str::to_string)
                .unwrap_or_else(|| c[0].to_string())
        });

        let text = MONTH_ABBREVIATION.replace_all(&text, |c: &Captures| {
            month_from_word(&c[1])
                .and_then(month_name)
                .map(str::to_string)
                .unwrap_or_else(|| c[0].to_string())
        });

        let text = KM_UNIT.replace_all(&text, |c: &Captures| {
            format!("{} km", c[1].replace(',', "."))
        });

        text.into_owned()
    }
}
