//! Chain-scoped session state.
//!
//! Sessions outlive individual requests and are shared by every processor
//! of a chain, so stores are internally synchronized. Expired sessions are
//! reclaimed by the periodic cleanup sweep.

mod memory;

pub use memory::InMemorySessionStore;

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Duration, Instant};

/// Length of generated session ids.
pub const SESSION_ID_LEN: usize = 32;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque session id (cookie value)
    pub id: String,
    /// Authenticated subject
    pub subject: String,
    /// Creation time
    pub created_at: Instant,
    /// Last time the session was used
    pub last_accessed: Instant,
}

impl Session {
    /// Create a new session with a random id.
    pub fn new(subject: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: generate_session_id(),
            subject: subject.into(),
            created_at: now,
            last_accessed: now,
        }
    }

    /// Whether the session is expired at `now`.
    pub fn is_expired_at(&self, now: Instant, absolute: Duration, idle: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= absolute
            || now.saturating_duration_since(self.last_accessed) >= idle
    }
}

/// Session storage backend.
pub trait SessionStore: Send + Sync {
    /// Look up a live session and mark it as used.
    ///
    /// Expired sessions are removed and reported as absent.
    fn get(&self, id: &str) -> Option<Session>;

    /// Insert or replace a session.
    fn set(&self, session: Session);

    /// Remove a session. Returns whether it existed.
    fn remove(&self, id: &str) -> bool;

    /// Remove every expired session. Returns how many were removed.
    fn remove_all_expired(&self) -> usize;

    /// Number of stored sessions, expired or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate an unguessable session id.
pub fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
