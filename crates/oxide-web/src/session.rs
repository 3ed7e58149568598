//! Session storage.
//!
//! The engine only talks to sessions through [`SessionStore`]; persistence is
//! up to the implementation. [`MemorySessionStore`] keeps everything in a
//! concurrent map and is what servers use unless told otherwise.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, WebError};

/// Attribute map of one session.
pub type SessionAttributes = HashMap<String, Value>;

/// Backing store for sessions.
///
/// Every operation must be atomic for a given session id: concurrent
/// requests of the same client call these methods without any locking on
/// the engine side.
pub trait SessionStore: Send + Sync {
    /// Creates an empty session and returns its id.
    fn create(&self) -> Result<String>;

    /// Attributes of a live session, `None` when the id is unknown.
    fn get(&self, id: &str) -> Result<Option<SessionAttributes>>;

    /// Sets one attribute.
    fn set(&self, id: &str, key: &str, value: Value) -> Result<()>;

    /// Removes one attribute.
    fn remove(&self, id: &str, key: &str) -> Result<()>;

    /// Drops the whole session.
    fn destroy(&self, id: &str) -> Result<()>;
}

#[derive(Debug)]
struct StoredSession {
    attributes: SessionAttributes,
    last_access: DateTime<Utc>,
}

impl StoredSession {
    fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            last_access: Utc::now(),
        }
    }
}

/// In-process session store with idle expiry.
///
/// Expired sessions are dropped when their id is used again, and by a full
/// sweep every [`PURGE_INTERVAL`](Self::PURGE_INTERVAL) creations.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    max_idle: Duration,
    created: AtomicUsize,
}

impl MemorySessionStore {
    /// Default idle time before a session is dropped (30 minutes).
    pub const DEFAULT_MAX_IDLE_MINUTES: i64 = 30;

    /// Number of creations between two sweeps of expired sessions.
    pub const PURGE_INTERVAL: usize = 64;

    /// Creates a store with the default idle expiry.
    pub fn new() -> Self {
        Self::with_max_idle(Duration::minutes(Self::DEFAULT_MAX_IDLE_MINUTES))
    }

    /// Creates a store dropping sessions idle for longer than `max_idle`.
    pub fn with_max_idle(max_idle: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_idle,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of sessions held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every expired session and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut dropped = 0;
        self.sessions.retain(|_, session| {
            let live = !self.is_expired(session, now);
            if !live {
                dropped += 1;
            }
            live
        });
        if dropped > 0 {
            debug!(dropped, "purged expired sessions");
        }
        dropped
    }

    fn is_expired(&self, session: &StoredSession, now: DateTime<Utc>) -> bool {
        now - session.last_access > self.max_idle
    }

    fn with_live<T>(&self, id: &str, f: impl FnOnce(&mut StoredSession) -> T) -> Option<T> {
        let now = Utc::now();
        {
            let mut entry = self.sessions.get_mut(id)?;
            if !self.is_expired(&entry, now) {
                entry.last_access = now;
                return Some(f(&mut entry));
            }
        }
        self.sessions.remove(id);
        None
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self) -> Result<String> {
        if self.created.fetch_add(1, Ordering::Relaxed) % Self::PURGE_INTERVAL
            == Self::PURGE_INTERVAL - 1
        {
            self.purge_expired();
        }
        loop {
            let id = generate_session_key();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.sessions.entry(id.clone()) {
                slot.insert(StoredSession::new());
                return Ok(id);
            }
        }
    }

    fn get(&self, id: &str) -> Result<Option<SessionAttributes>> {
        Ok(self.with_live(id, |s| s.attributes.clone()))
    }

    fn set(&self, id: &str, key: &str, value: Value) -> Result<()> {
        self.with_live(id, |s| {
            s.attributes.insert(key.to_string(), value);
        })
        .ok_or_else(|| WebError::SessionNotFound(id.to_string()))
    }

    fn remove(&self, id: &str, key: &str) -> Result<()> {
        self.with_live(id, |s| {
            s.attributes.remove(key);
        })
        .ok_or_else(|| WebError::SessionNotFound(id.to_string()))
    }

    fn destroy(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}

/// Handle on the session of the current request.
#[derive(Clone)]
pub struct Session {
    id: String,
    is_new: bool,
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub(crate) fn new(id: String, is_new: bool, store: Arc<dyn SessionStore>) -> Self {
        Self { id, is_new, store }
    }

    /// Session id, as carried by the session cookie.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns whether the session was created by the current request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Every attribute.
    pub fn attributes(&self) -> Result<SessionAttributes> {
        self.store
            .get(&self.id)?
            .ok_or_else(|| WebError::SessionNotFound(self.id.clone()))
    }

    /// A raw attribute value.
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.attributes()?.remove(key))
    }

    /// A typed attribute value; `None` when absent or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self
            .get_value(key)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    /// Sets an attribute.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        self.store.set(&self.id, key, serde_json::to_value(value)?)
    }

    /// Removes an attribute.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(&self.id, key)
    }

    /// Drops the session from the store.
    pub fn invalidate(&self) -> Result<()> {
        self.store.destroy(&self.id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("is_new", &self.is_new)
            .finish_non_exhaustive()
    }
}

/// Generates a cryptographically secure session key.
fn generate_session_key() -> String {
    use rand::RngExt;
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
