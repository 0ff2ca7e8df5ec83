//! Club leaderboard over every stored record
//!
//! Standings come from a full scan of the store, not from retrieved context.
//! A member's per-activity records are preferred; their aggregated log is
//! parsed only when no per-activity record exists, so nothing is counted
//! twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use runclub_core::{month_name, Standing, StoredRecord, TimeWindow};
use runclub_rag::VectorIndex;

use crate::compute::{parse_log, Period};
use crate::AgentError;

/// Leaderboard period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardScope {
    #[default]
    All,
    Year,
    Month,
    Week,
}

impl LeaderboardScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "all" => Some(Self::All),
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "week" => Some(Self::Week),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Year => "year",
            Self::Month => "month",
            Self::Week => "week",
        }
    }
}

/// Scope plus optional explicit year/month/ISO week; omitted parts default to `now`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRequest {
    pub scope: LeaderboardScope,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
}

impl LeaderboardRequest {
    pub fn new(scope: LeaderboardScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_week(mut self, week: u32) -> Self {
        self.week = Some(week);
        self
    }

    /// Window and display label for this request at `now`
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(Option<TimeWindow>, String), AgentError> {
        let today = now.date_naive();
        match self.scope {
            LeaderboardScope::All => Ok((None, "semua waktu".to_string())),
            LeaderboardScope::Year => {
                let year = self.year.unwrap_or(today.year());
                let window = TimeWindow::year(year)
                    .ok_or_else(|| AgentError::InvalidInput(format!("year {} is out of range", year)))?;
                Ok((Some(window), format!("tahun {}", year)))
            },
            LeaderboardScope::Month => {
                let year = self.year.unwrap_or(today.year());
                let month = self.month.unwrap_or(today.month());
                let window = TimeWindow::month(year, month).ok_or_else(|| {
                    AgentError::InvalidInput(format!("month {} is out of range", month))
                })?;
                let name = month_name(month).unwrap_or_default();
                Ok((Some(window), format!("{} {}", name, year)))
            },
            LeaderboardScope::Week => {
                let current = today.iso_week();
                let year = self.year.unwrap_or(current.year());
                let week = self.week.unwrap_or(current.week());
                let window = TimeWindow::iso_week(year, week).ok_or_else(|| {
                    AgentError::InvalidInput(format!("week {} of {} is out of range", week, year))
                })?;
                Ok((Some(window), format!("minggu {} tahun {}", week, year)))
            },
        }
    }
}

/// Which records and log lines count toward a standing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StandingsFilter {
    All,
    Window(TimeWindow),
    Period(Period),
}

impl StandingsFilter {
    fn admits_ts(&self, ts: i64) -> bool {
        match self {
            Self::All => true,
            Self::Window(window) => DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|t| window.contains(t))
                .unwrap_or(false),
            Self::Period(period) => {
                let date = DateTime::<Utc>::from_timestamp(ts, 0).map(|t| t.date_naive());
                date.is_some() && period.admits(date)
            },
        }
    }

    fn admits_date(&self, date: Option<NaiveDate>) -> bool {
        match (self, date) {
            (Self::All, _) => true,
            (Self::Window(window), Some(d)) => window.contains_date(d),
            (Self::Period(period), Some(_)) => period.admits(date),
            (_, None) => false,
        }
    }
}

/// Result of one leaderboard call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardTable {
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    pub standings: Vec<Standing>,
}

#[derive(Default)]
struct Tally {
    member: String,
    total_km: f64,
    activities: usize,
}

/// Per-member totals, descending; members without qualifying activity are left out
pub fn aggregate(records: &[StoredRecord], filter: &StandingsFilter) -> Vec<Standing> {
    let key = |subject: &str| subject.trim().to_lowercase();

    let itemized: HashSet<String> = records
        .iter()
        .filter(|r| r.activity_ts.is_some() && r.distance_km.is_some())
        .filter_map(|r| r.subject.as_deref().map(key))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, Tally> = HashMap::new();

    for record in records {
        let Some(subject) = record.subject.as_deref() else {
            continue;
        };
        let k = key(subject);
        let tally = tallies.entry(k.clone()).or_insert_with(|| {
            order.push(k.clone());
            Tally {
                member: subject.trim().to_string(),
                ..Default::default()
            }
        });

        match (record.activity_ts, record.distance_km) {
            (Some(ts), Some(km)) => {
                if filter.admits_ts(ts) {
                    tally.total_km += km;
                    tally.activities += 1;
                }
            },
            _ if !itemized.contains(&k) => {
                for entry in parse_log(&record.summary) {
                    if filter.admits_date(entry.date) {
                        tally.total_km += entry.km;
                        tally.activities += 1;
                    }
                }
            },
            _ => {},
        }
    }

    let mut standings: Vec<Standing> = order
        .into_iter()
        .filter_map(|k| tallies.remove(&k))
        .filter(|t| t.activities > 0)
        .map(|t| Standing {
            member: t.member,
            total_km: (t.total_km * 100.0).round() / 100.0,
            activities: t.activities,
        })
        .collect();
    // stable: ties keep store order
    standings.sort_by(|a, b| b.total_km.total_cmp(&a.total_km));
    standings
}

pub struct Leaderboard {
    index: Arc<dyn VectorIndex>,
}

impl Leaderboard {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Standings under `filter`, scanning the whole store
    pub async fn standings(&self, filter: &StandingsFilter) -> Result<Vec<Standing>, AgentError> {
        let records = self.index.scroll_all().await?;
        let standings = aggregate(&records, filter);
        tracing::debug!(
            records = records.len(),
            members = standings.len(),
            "Leaderboard aggregated"
        );
        Ok(standings)
    }

    pub async fn table(
        &self,
        request: &LeaderboardRequest,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardTable, AgentError> {
        let (window, scope) = request.resolve(now)?;
        let filter = window.map_or(StandingsFilter::All, StandingsFilter::Window);
        Ok(LeaderboardTable {
            scope,
            window,
            standings: self.standings(&filter).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use runclub_rag::InMemoryIndex;

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap().timestamp()
    }

    fn run(id: &str, member: &str, km: f64, at: i64) -> StoredRecord {
        StoredRecord::new(id, format!("{} lari {} km", member, km))
            .with_subject(member)
            .with_distance_km(km)
            .with_activity_ts(at)
    }

    fn records() -> Vec<StoredRecord> {
        vec![
            run("1", "Budi", 5.0, ts(2025, 1, 5)),
            run("2", "Sari", 10.0, ts(2025, 1, 6)),
            run("3", "Budi", 7.5, ts(2025, 2, 1)),
            // aggregated log duplicates Budi's runs and is ignored
            StoredRecord::new("log-budi", "2025-01-05: Run sejauh 5.00 km - 2025-02-01: Run sejauh 7.50 km")
                .with_subject("Budi"),
            // a member known only through an aggregated log
            StoredRecord::new("log-agus", "2025-01-20: Run sejauh 3.00 km - Run sejauh 1.00 km")
                .with_subject("Agus"),
        ]
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(LeaderboardScope::parse("MONTH"), Some(LeaderboardScope::Month));
        assert_eq!(LeaderboardScope::parse(""), Some(LeaderboardScope::All));
        assert_eq!(LeaderboardScope::parse("decade"), None);
    }

    #[test]
    fn test_all_time_standings() {
        let standings = aggregate(&records(), &StandingsFilter::All);
        let members: Vec<&str> = standings.iter().map(|s| s.member.as_str()).collect();
        assert_eq!(members, vec!["Budi", "Sari", "Agus"]);
        assert_eq!(standings[0].total_km, 12.5);
        assert_eq!(standings[0].activities, 2);
        assert_eq!(standings[2].total_km, 4.0);
    }

    #[test]
    fn test_month_window_excludes_undated_lines() {
        let january = StandingsFilter::Window(TimeWindow::month(2025, 1).unwrap());
        let standings = aggregate(&records(), &january);
        assert_eq!(standings[0].member, "Sari");
        assert_eq!(standings[1].member, "Budi");
        assert_eq!(standings[1].total_km, 5.0);
        assert_eq!(standings[2].member, "Agus");
        assert_eq!(standings[2].total_km, 3.0);
    }

    #[test]
    fn test_period_filter_without_year() {
        let february = StandingsFilter::Period(Period::new(Some(2), None));
        let standings = aggregate(&records(), &february);
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].member, "Budi");
    }

    #[test]
    fn test_resolve_scopes() {
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();

        let (window, label) = LeaderboardRequest::new(LeaderboardScope::Month)
            .resolve(now)
            .unwrap();
        assert_eq!(window, TimeWindow::month(2025, 3));
        assert_eq!(label, "maret 2025");

        let (window, _) = LeaderboardRequest::new(LeaderboardScope::Week)
            .with_year(2025)
            .with_week(2)
            .resolve(now)
            .unwrap();
        assert_eq!(window, TimeWindow::iso_week(2025, 2));

        let err = LeaderboardRequest::new(LeaderboardScope::Month)
            .with_month(13)
            .resolve(now);
        assert!(matches!(err, Err(AgentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_table_scans_store() {
        let index = Arc::new(InMemoryIndex::new());
        for record in records() {
            index.upsert(record, vec![1.0, 0.0]);
        }
        let board = Leaderboard::new(index);
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();

        let table = board
            .table(&LeaderboardRequest::new(LeaderboardScope::Month), now)
            .await
            .unwrap();
        assert_eq!(table.scope, "februari 2025");
        assert_eq!(table.standings.len(), 1);
        assert_eq!(table.standings[0].total_km, 7.5);

        let empty = Leaderboard::new(Arc::new(InMemoryIndex::new()));
        let table = empty
            .table(&LeaderboardRequest::default(), now)
            .await
            .unwrap();
        assert!(table.standings.is_empty());
    }
}
