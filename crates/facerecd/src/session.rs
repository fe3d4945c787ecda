//! Server-side sessions keyed by a random cookie.

use facerec_core::SessionState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "facerec_session";

/// Handle to one client's state. Requests in the same session serialize on it.
pub type SharedSession = Arc<Mutex<SessionState>>;

struct Entry {
    state: SharedSession,
    last_seen: Instant,
}

/// In-memory session table.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session named by the request cookie, or a fresh one with the
    /// cookie set on the response.
    pub fn acquire(&self, cookies: &Cookies) -> SharedSession {
        let cookie = cookies.get(SESSION_COOKIE);
        let (state, created) = self.resolve(cookie.as_ref().map(|c| c.value()));

        if let Some(id) = created {
            cookies.add(
                Cookie::build((SESSION_COOKIE, id.to_string()))
                    .path("/")
                    .http_only(true)
                    .same_site(SameSite::Lax)
                    .build(),
            );
            tracing::debug!(session = %id, "session created");
        }
        state
    }

    /// Look up the session for a cookie value. Unknown, expired or malformed
    /// ids get a new session, whose id is returned alongside it.
    pub(crate) fn resolve(&self, cookie: Option<&str>) -> (SharedSession, Option<Uuid>) {
        let mut entries = self.entries();
        let existing = cookie.and_then(|v| Uuid::parse_str(v).ok());
        if let Some(entry) = existing.and_then(|id| entries.get_mut(&id)) {
            entry.last_seen = Instant::now();
            return (entry.state.clone(), None);
        }

        let id = Uuid::new_v4();
        let state = SharedSession::default();
        entries.insert(
            id,
            Entry {
                state: state.clone(),
                last_seen: Instant::now(),
            },
        );
        (state, Some(id))
    }

    /// Drop sessions idle for longer than the TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.last_seen.elapsed() <= ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Lock a session, recovering the state if a previous holder panicked.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionState> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
