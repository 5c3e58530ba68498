//! In-memory session store.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::{Session, SessionStore};

/// In-memory session store.
///
/// Backed by a sharded [`DashMap`]: lookups, writes and the expiry sweep
/// only ever lock one shard at a time.
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    absolute_timeout: Duration,
    idle_timeout: Duration,
}

impl InMemorySessionStore {
    /// Create a store with the given absolute and idle timeouts.
    pub fn new(absolute_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            absolute_timeout,
            idle_timeout,
        }
    }

    pub fn absolute_timeout(&self) -> Duration {
        self.absolute_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        session.is_expired_at(now, self.absolute_timeout, self.idle_timeout)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Option<Session> {
        let now = Instant::now();

        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(entry) if self.is_expired(entry.get(), now) => {
                entry.remove();
                trace!("session expired on lookup");
                None
            }
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                session.last_accessed = now;
                Some(session.clone())
            }
            Entry::Vacant(_) => None,
        }
    }

    fn set(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn remove_all_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.sessions.retain(|_, session| {
            let expired = self.is_expired(session, now);
            if expired {
                removed += 1;
            }
            !expired
        });
        removed
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
