//! Per-conversation memory of resolved filters

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Last resolved subject/month/year for a session
///
/// Expiry is evaluated lazily by the store on access; nothing sweeps
/// expired entries in the background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub subject: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub last_query: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            subject: None,
            month: None,
            year: None,
            last_query: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Extend the TTL from `now`
    pub fn refresh(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }

    pub fn is_blank(&self) -> bool {
        self.subject.is_none() && self.month.is_none() && self.year.is_none() && self.last_query.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiry_boundary() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let state = SessionState::new(t, Duration::seconds(3600));
        assert!(!state.is_expired(t + Duration::seconds(3600)));
        assert!(state.is_expired(t + Duration::seconds(3601)));
    }

    #[test]
    fn test_refresh_extends_ttl() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut state = SessionState::new(t, Duration::seconds(60));
        state.refresh(t + Duration::seconds(50), Duration::seconds(60));
        assert!(!state.is_expired(t + Duration::seconds(100)));
        assert_eq!(state.created_at, t);
    }
}
