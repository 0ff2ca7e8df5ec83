//! Computed facts and leaderboard standings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Total,
    ThresholdMet,
    ThresholdNotMet,
    Comparison,
}

/// A verified statement derived from exactly one context slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub subject: String,
    pub kind: FactKind,
    /// Distance in km (total, matched distance, or difference)
    pub value_km: f64,
    pub activities: usize,
    /// 1-based context slot the fact was computed from
    pub slot: usize,
    /// Rendered sentence, numbers already formatted
    pub statement: String,
}

impl Fact {
    /// Statement with its citation marker
    pub fn cited_statement(&self) -> String {
        format!("{} [{}]", self.statement, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub member: String,
    pub total_km: f64,
    pub activities: usize,
}

/// Everything the computation engine produced for one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSheet {
    pub facts: Vec<Fact>,
    /// Explicit "no matching data" statements
    pub notes: Vec<String>,
    pub standings: Vec<Standing>,
    /// Label of the leaderboard scope, when standings are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl FactSheet {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.notes.is_empty() && self.standings.is_empty()
    }

    /// Lines for a guarded prompt or a templated answer
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.facts.iter().map(Fact::cited_statement).collect();
        lines.extend(self.notes.iter().cloned());
        if !self.standings.is_empty() {
            let scope = self.scope.as_deref().unwrap_or("semua waktu");
            lines.push(format!("Peringkat jarak ({}):", scope));
            for (rank, s) in self.standings.iter().enumerate() {
                lines.push(format!(
                    "{}. {}: {:.2} km dari {} aktivitas",
                    rank + 1,
                    s.member,
                    s.total_km,
                    s.activities
                ));
            }
        }
        lines
    }

    /// Context slots the facts were derived from, ascending
    pub fn slots(&self) -> Vec<usize> {
        let mut slots: Vec<usize> = self.facts.iter().map(|f| f.slot).collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}
