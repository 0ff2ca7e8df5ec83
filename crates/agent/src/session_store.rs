//! Session memory with lazy TTL expiry
//!
//! Expired entries are detected on access and replaced by a fresh state;
//! nothing sweeps the map in the background. Updates run under the
//! per-key shard lock, so a read-modify-write of one session is atomic.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use runclub_config::SessionConfig;
use runclub_core::SessionState;

/// Time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Narrow session store interface
pub trait SessionStore: Send + Sync {
    /// Current state; a fresh one when absent or expired
    fn get(&self, session_id: &str) -> SessionState;

    /// Apply `f` to the live state and refresh its TTL, returning the result
    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionState)) -> SessionState;

    /// Drop the session; true when one existed
    fn clear(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionState>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(Duration::seconds(config.ttl_seconds as i64))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session_id: &str) -> SessionState {
        let now = self.clock.now();
        match self.sessions.get(session_id) {
            Some(state) if !state.is_expired(now) => state.value().clone(),
            _ => SessionState::new(now, self.ttl),
        }
    }

    fn update(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionState)) -> SessionState {
        let now = self.clock.now();
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now, self.ttl));

        if entry.is_expired(now) {
            tracing::debug!(session_id, "Session expired, starting fresh");
            *entry = SessionState::new(now, self.ttl);
        }

        f(entry.value_mut());
        entry.refresh(now, self.ttl);
        entry.value().clone()
    }

    fn clear(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (InMemorySessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        ));
        let store = InMemorySessionStore::with_clock(Duration::seconds(3600), clock.clone());
        (store, clock)
    }

    #[test]
    fn test_update_then_get() {
        let (store, _) = store();
        store.update("s1", &mut |s| {
            s.subject = Some("Budi".into());
            s.month = Some(1);
        });
        let state = store.get("s1");
        assert_eq!(state.subject.as_deref(), Some("Budi"));
        assert_eq!(state.month, Some(1));
        assert!(store.get("other").is_blank());
    }

    #[test]
    fn test_expired_session_reads_blank() {
        let (store, clock) = store();
        store.update("s1", &mut |s| s.subject = Some("Budi".into()));

        clock.advance(Duration::seconds(3600));
        assert_eq!(store.get("s1").subject.as_deref(), Some("Budi"));

        clock.advance(Duration::seconds(1));
        assert!(store.get("s1").is_blank());
    }

    #[test]
    fn test_update_on_expired_session_starts_fresh() {
        let (store, clock) = store();
        store.update("s1", &mut |s| {
            s.subject = Some("Budi".into());
            s.year = Some(2025);
        });
        clock.advance(Duration::seconds(4000));

        let state = store.update("s1", &mut |s| s.month = Some(2));
        assert!(state.subject.is_none());
        assert!(state.year.is_none());
        assert_eq!(state.month, Some(2));
        assert_eq!(state.created_at, clock.now());
    }

    #[test]
    fn test_update_refreshes_ttl() {
        let (store, clock) = store();
        store.update("s1", &mut |s| s.subject = Some("Sari".into()));
        clock.advance(Duration::seconds(3000));
        store.update("s1", &mut |s| s.month = Some(3));
        clock.advance(Duration::seconds(3000));
        assert_eq!(store.get("s1").subject.as_deref(), Some("Sari"));
    }

    #[test]
    fn test_clear() {
        let (store, _) = store();
        store.update("s1", &mut |_| {});
        assert_eq!(store.len(), 1);
        assert!(store.clear("s1"));
        assert!(!store.clear("s1"));
        assert!(store.is_empty());
    }
}
