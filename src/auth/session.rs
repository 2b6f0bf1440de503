//! Bearer-token sessions and login failure tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::controller::{ControllerError, ControllerOptions, ViewController};
use crate::store::DataStore;
use crate::types::UserRecord;

/// One logged-in user: their data store and dashboard controller.
pub struct Session {
    pub token: String,
    pub user: UserRecord,
    /// Shared with the controller so logout can reset it while a load runs
    pub store: Arc<DataStore>,
    pub controller: Mutex<ViewController>,
    created_at: Instant,
    /// Milliseconds since `created_at`
    last_seen_ms: AtomicU64,
}

impl Session {
    fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis();
        self.last_seen_ms
            .store(u64::try_from(elapsed).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_ms.load(Ordering::Relaxed));
        self.created_at.elapsed().saturating_sub(last_seen)
    }
}

/// Live sessions keyed by token.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    ttl: Duration,
    options: ControllerOptions,
}

impl SessionStore {
    pub fn new(ttl: Duration, options: ControllerOptions) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            options,
        }
    }

    /// Open a session for an authenticated user.
    pub fn create(&self, user: UserRecord) -> Result<Arc<Session>, ControllerError> {
        let store = Arc::new(DataStore::new());
        let mut controller = ViewController::new(Arc::clone(&store), self.options);
        controller.start(user.clone())?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let session = Arc::new(Session {
            token: token.clone(),
            user,
            store,
            controller: Mutex::new(controller),
            created_at: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        });
        self.sessions.insert(token, Arc::clone(&session));
        info!(user = %session.user.name, sessions = self.sessions.len(), "Session opened");
        Ok(session)
    }

    /// Live session for `token`; refreshes its idle timer.
    pub fn get(&self, token: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(token).map(|s| Arc::clone(s.value()))?;
        if session.idle_for() >= self.ttl {
            self.remove(token);
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Close a session. Its store is reset so loads still running are discarded.
    pub fn remove(&self, token: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(token)?;
        session.store.reset();
        info!(user = %session.user.name, "Session closed");
        Some(session)
    }

    /// Drop sessions idle for longer than the TTL. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() >= self.ttl)
            .map(|entry| entry.key().clone())
            .collect();
        for token in &expired {
            self.remove(token);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Recent login failures per user name.
pub struct LoginAttempts {
    failures: DashMap<String, (u32, Instant)>,
    max_failures: u32,
    window: Duration,
}

impl LoginAttempts {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            failures: DashMap::new(),
            max_failures,
            window,
        }
    }

    /// True when `name` reached the failure limit inside the window.
    pub fn is_locked(&self, name: &str) -> bool {
        self.failures.get(name).is_some_and(|entry| {
            let (count, first) = *entry.value();
            count >= self.max_failures && first.elapsed() < self.window
        })
    }

    pub fn record_failure(&self, name: &str) {
        let mut entry = self
            .failures
            .entry(name.to_string())
            .or_insert((0, Instant::now()));
        if entry.1.elapsed() >= self.window {
            *entry = (0, Instant::now());
        }
        entry.0 += 1;
        debug!(user = %name, failures = entry.0, "Login failure recorded");
    }

    pub fn clear(&self, name: &str) {
        self.failures.remove(name);
    }

    pub fn purge_expired(&self) {
        self.failures
            .retain(|_, (_, first)| first.elapsed() < self.window);
    }
}

/// Spawn a background task that purges expired sessions and stale login
/// failures every `interval`.
pub fn spawn_session_cleanup(
    sessions: Arc<SessionStore>,
    attempts: Arc<LoginAttempts>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, "Expired sessions purged");
            }
            attempts.purge_expired();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRecord {
        UserRecord {
            id: "1".into(),
            name: "mdupont".into(),
            email: None,
            agency_ids: vec!["TOUTES".into()],
            service: None,
        }
    }

    #[test]
    fn test_create_get_remove() {
        let store = SessionStore::new(Duration::from_secs(60), ControllerOptions::default());
        let session = store.create(user()).unwrap();
        assert_eq!(session.token.len(), 32);
        assert!(store.get(&session.token).is_some());
        assert!(store.get("unknown").is_none());

        let epoch = session.store.epoch();
        store.remove(&session.token);
        assert!(store.get(&session.token).is_none());
        assert_eq!(session.store.epoch(), epoch + 1);
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let store = SessionStore::new(Duration::ZERO, ControllerOptions::default());
        let session = store.create(user()).unwrap();
        assert!(store.get(&session.token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let store = SessionStore::new(Duration::ZERO, ControllerOptions::default());
        store.create(user()).unwrap();
        store.create(user()).unwrap();
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_login_attempts_lock_after_limit() {
        let attempts = LoginAttempts::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            attempts.record_failure("bob");
        }
        assert!(!attempts.is_locked("bob"));
        attempts.record_failure("bob");
        assert!(attempts.is_locked("bob"));
        assert!(!attempts.is_locked("alice"));
        attempts.clear("bob");
        assert!(!attempts.is_locked("bob"));
    }

    #[test]
    fn test_login_attempts_window_expires() {
        let attempts = LoginAttempts::new(1, Duration::ZERO);
        attempts.record_failure("bob");
        assert!(!attempts.is_locked("bob"));
    }
}
