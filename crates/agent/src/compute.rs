//! Deterministic computation over activity log text
//!
//! Log text is a run of ` - ` separated lines shaped like
//! `YYYY-MM-DD: <activity> sejauh <value> km`. Only lines with that shape
//! are trusted; when a period filter is active, a line without a parseable
//! date is excluded rather than guessed into the period.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use runclub_core::{month_name, Fact, FactKind, FactSheet, Intent, Query, RankedContext};

static LOG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})-(\d{2})-(\d{2})\s*:\s*").expect("valid regex")
});

static LOG_DISTANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)sejauh\s+([0-9]+(?:[.,][0-9]+)?)\s*km").expect("valid regex")
});

const LINE_SEPARATOR: &str = " - ";

/// One distance-bearing log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub date: Option<NaiveDate>,
    pub km: f64,
    pub line: String,
}

/// Distance-bearing lines of `text`, in order
pub fn parse_log(text: &str) -> Vec<LogEntry> {
    text.split(LINE_SEPARATOR)
        .filter_map(|line| {
            let km = LOG_DISTANCE
                .captures(line)
                .and_then(|c| c[1].replace(',', ".").parse::<f64>().ok())?;
            let date = LOG_DATE.captures(line).and_then(|c| {
                NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            });
            Some(LogEntry {
                date,
                km,
                line: line.trim().to_string(),
            })
        })
        .collect()
}

/// Month/year filter applied to log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl Period {
    pub fn new(month: Option<u32>, year: Option<i32>) -> Self {
        Self { month, year }
    }

    pub fn from_query(query: &Query) -> Self {
        Self::new(query.month, query.year)
    }

    pub fn is_unbounded(&self) -> bool {
        self.month.is_none() && self.year.is_none()
    }

    pub fn admits(&self, date: Option<NaiveDate>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(date) = date else {
            return false;
        };
        self.month.map_or(true, |m| date.month() == m) && self.year.map_or(true, |y| date.year() == y)
    }

    /// "bulan januari 2025", "tahun 2025", or None when unbounded
    pub fn label(&self) -> Option<String> {
        match (self.month.and_then(month_name), self.year) {
            (Some(m), Some(y)) => Some(format!("bulan {} {}", m, y)),
            (Some(m), None) => Some(format!("bulan {}", m)),
            (None, Some(y)) => Some(format!("tahun {}", y)),
            (None, None) => None,
        }
    }

    fn suffix(&self) -> String {
        self.label().map(|l| format!(" pada {}", l)).unwrap_or_default()
    }
}

/// Sum of admitted distances and the number of activities
pub fn total_km(entries: &[LogEntry], period: &Period) -> (f64, usize) {
    let (sum, count) = entries
        .iter()
        .filter(|e| period.admits(e.date))
        .fold((0.0, 0), |(sum, n), e| (sum + e.km, n + 1));
    ((sum * 100.0_f64).round() / 100.0, count)
}

/// First admitted line reaching `threshold_km`
pub fn first_at_least<'a>(
    entries: &'a [LogEntry],
    threshold_km: f64,
    period: &Period,
) -> Option<&'a LogEntry> {
    entries
        .iter()
        .find(|e| period.admits(e.date) && e.km >= threshold_km)
}

/// Log lines of one subject plus the context slot they are cited from
#[derive(Debug, Clone)]
pub struct SubjectLog {
    pub subject: String,
    pub slot: usize,
    pub entries: Vec<LogEntry>,
}

impl SubjectLog {
    /// The subject's aggregated log if present in context, else the union of
    /// its per-activity records cited from the first one
    pub fn from_context(context: &RankedContext, subject: &str) -> Option<Self> {
        let slot = context.slot_for_subject(subject)?;
        let primary = context.slot(slot)?;

        let entries = if primary.record.activity_ts.is_none() {
            parse_log(primary.summary())
        } else {
            context
                .iter()
                .filter(|c| {
                    c.subject()
                        .map(|s| s.eq_ignore_ascii_case(subject))
                        .unwrap_or(false)
                })
                .flat_map(|c| parse_log(c.summary()))
                .collect()
        };

        Some(Self {
            subject: primary.subject().unwrap_or(subject).to_string(),
            slot,
            entries,
        })
    }
}

/// Builds fact sheets for numeric intents
#[derive(Debug, Clone, Default)]
pub struct ComputationEngine;

impl ComputationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Facts for `query` over `context`; empty for non-numeric intents
    pub fn compute(&self, query: &Query, context: &RankedContext) -> FactSheet {
        let period = Period::from_query(query);
        let mut sheet = FactSheet::default();

        match query.intent {
            Intent::Total => {
                for subject in &query.subjects {
                    match SubjectLog::from_context(context, subject) {
                        Some(log) => sheet.facts.push(self.total_fact(&log, &period)),
                        None => sheet.notes.push(missing_note(subject)),
                    }
                }
            },
            Intent::Threshold => {
                let Some(threshold) = query.target_km else {
                    return sheet;
                };
                for subject in &query.subjects {
                    match SubjectLog::from_context(context, subject) {
                        Some(log) => sheet.facts.push(self.threshold_fact(&log, threshold, &period)),
                        None => sheet.notes.push(missing_note(subject)),
                    }
                }
            },
            Intent::Compare if query.subjects.len() >= 2 => {
                let logs: Vec<SubjectLog> = query.subjects[..2]
                    .iter()
                    .filter_map(|s| {
                        let log = SubjectLog::from_context(context, s);
                        if log.is_none() {
                            sheet.notes.push(missing_note(s));
                        }
                        log
                    })
                    .collect();
                if let [a, b] = logs.as_slice() {
                    sheet.facts.extend(self.compare_facts(a, b, &period));
                }
            },
            _ => {},
        }

        tracing::debug!(
            intent = %query.intent,
            facts = sheet.facts.len(),
            notes = sheet.notes.len(),
            "Facts computed"
        );
        sheet
    }

    pub fn total_fact(&self, log: &SubjectLog, period: &Period) -> Fact {
        let (total, count) = total_km(&log.entries, period);
        let statement = if count == 0 {
            format!(
                "Tidak ada aktivitas lari {} yang tercatat{}",
                log.subject,
                period.suffix()
            )
        } else {
            let scope = period
                .label()
                .map(|l| format!("pada {}", l))
                .unwrap_or_else(|| "(semua data)".to_string());
            format!(
                "Total jarak lari {} {}: {:.2} km dari {} aktivitas",
                log.subject, scope, total, count
            )
        };

        Fact {
            subject: log.subject.clone(),
            kind: FactKind::Total,
            value_km: total,
            activities: count,
            slot: log.slot,
            statement,
        }
    }

    pub fn threshold_fact(&self, log: &SubjectLog, threshold_km: f64, period: &Period) -> Fact {
        match first_at_least(&log.entries, threshold_km, period) {
            Some(entry) => Fact {
                subject: log.subject.clone(),
                kind: FactKind::ThresholdMet,
                value_km: entry.km,
                activities: 1,
                slot: log.slot,
                statement: format!(
                    "Ya, {} pernah lari ≥ {:.2} km{}. Contoh: {}",
                    log.subject,
                    threshold_km,
                    period.suffix(),
                    entry.line
                ),
            },
            None => Fact {
                subject: log.subject.clone(),
                kind: FactKind::ThresholdNotMet,
                value_km: threshold_km,
                activities: 0,
                slot: log.slot,
                statement: format!(
                    "Sejauh data yang ada, {} belum pernah lari ≥ {:.2} km{}",
                    log.subject,
                    threshold_km,
                    period.suffix()
                ),
            },
        }
    }

    /// Both totals plus the winner, cited from the winner's slot
    pub fn compare_facts(&self, a: &SubjectLog, b: &SubjectLog, period: &Period) -> Vec<Fact> {
        let first = self.total_fact(a, period);
        let second = self.total_fact(b, period);

        let (leader, other) = if first.value_km >= second.value_km {
            (&first, &second)
        } else {
            (&second, &first)
        };
        let diff = ((leader.value_km - other.value_km).abs() * 100.0).round() / 100.0;
        let statement = if first.activities + second.activities == 0 {
            format!(
                "Belum ada data untuk membandingkan {} dan {}{}",
                a.subject,
                b.subject,
                period.suffix()
            )
        } else {
            format!("Lebih jauh: {} (+{:.2} km)", leader.subject, diff)
        };

        let comparison = Fact {
            subject: leader.subject.clone(),
            kind: FactKind::Comparison,
            value_km: diff,
            activities: leader.activities,
            slot: leader.slot,
            statement,
        };

        vec![first, second, comparison]
    }
}

fn missing_note(subject: &str) -> String {
    format!("Tidak ada data {} di konteks yang ditemukan", subject)
}
