//! In-memory, TTL-expiring conversation store.
//!
//! One store-wide `RwLock` guards the id → session map; each session has
//! its own `Mutex` so concurrent requests against different sessions never
//! contend. Lock order is always store → session, and no session lock is
//! held across subprocess or HTTP I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use gateway_core::openai::ChatMessage;
use gateway_core::{GatewayError, Result};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl Session {
    fn new(id: &str, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Session {
            id: id.to_string(),
            created_at: now,
            last_accessed: now,
            expires_at: now + ttl,
            messages: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        SessionSummary {
            id: s.id.clone(),
            created_at: s.created_at,
            last_accessed: s.last_accessed,
            expires_at: s.expires_at,
            message_count: s.messages.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub active: usize,
    pub total_messages: usize,
    pub ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    ttl: chrono::Duration,
    cleanup_interval: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
            cleanup_interval,
        }
    }

    /// Return the message log for `id`, creating a fresh session when the
    /// id is unknown or expired. Touches `last_accessed`.
    pub async fn get_or_create(&self, id: &str) -> Vec<ChatMessage> {
        let now = Utc::now();

        // Fast path: live session under the read lock.
        let existing = self.sessions.read().await.get(id).cloned();
        if let Some(handle) = existing {
            let mut session = handle.lock().await;
            if !session.is_expired(now) {
                session.last_accessed = now;
                return session.messages.clone();
            }
        }

        // Slow path: insert (or replace an expired record). Re-check under
        // the write lock so two concurrent creators settle on one record.
        let mut map = self.sessions.write().await;
        if let Some(handle) = map.get(id).cloned() {
            let mut session = handle.lock().await;
            if !session.is_expired(now) {
                session.last_accessed = now;
                return session.messages.clone();
            }
        }
        map.insert(
            id.to_string(),
            Arc::new(Mutex::new(Session::new(id, now, self.ttl))),
        );
        tracing::debug!(session_id = %id, "created session");
        Vec::new()
    }

    /// Append messages atomically and extend the TTL.
    ///
    /// Fails with `SessionExpired` when the session expired (or was swept)
    /// between the caller's read and this write.
    pub async fn append(&self, id: &str, messages: Vec<ChatMessage>) -> Result<()> {
        let handle = self.sessions.read().await.get(id).cloned();
        let Some(handle) = handle else {
            return Err(GatewayError::SessionExpired(id.to_string()));
        };

        let now = Utc::now();
        let mut session = handle.lock().await;
        if session.is_expired(now) {
            return Err(GatewayError::SessionExpired(id.to_string()));
        }
        session.messages.extend(messages);
        session.last_accessed = now;
        session.expires_at = now + self.ttl;
        Ok(())
    }

    /// Copy of the message log; does NOT extend the TTL.
    pub async fn snapshot(&self, id: &str) -> Option<Vec<ChatMessage>> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        let session = handle.lock().await;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.messages.clone())
    }

    /// Full session copy for the REST surface.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let handle = self.sessions.read().await.get(id).cloned()?;
        let session = handle.lock().await;
        if session.is_expired(Utc::now()) {
            return None;
        }
        Some(session.clone())
    }

    /// Remove synchronously. Returns whether a session existed.
    pub async fn delete(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Live sessions ordered by `last_accessed` descending.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let map = self.sessions.read().await;
        let mut summaries = Vec::with_capacity(map.len());
        for handle in map.values() {
            let session = handle.lock().await;
            if !session.is_expired(now) {
                summaries.push(SessionSummary::from(&*session));
            }
        }
        drop(map);
        summaries.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        summaries
    }

    pub async fn stats(&self) -> StoreStats {
        let summaries = self.list().await;
        StoreStats {
            active: summaries.len(),
            total_messages: summaries.iter().map(|s| s.message_count).sum(),
            ttl_seconds: self.ttl.num_seconds().max(0) as u64,
            cleanup_interval_seconds: self.cleanup_interval.as_secs(),
        }
    }

    /// One sweep pass: drop every expired session.
    ///
    /// Holds the store write lock, takes each session lock, re-checks
    /// expiry, and only then deletes — an in-flight `append` that already
    /// holds the session lock wins the race and keeps its session.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let mut map = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, handle) in map.iter() {
            let session = handle.lock().await;
            if session.is_expired(now) {
                expired.push(id.clone());
            }
        }
        for id in &expired {
            map.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "swept expired sessions");
        }
    }

    /// Spawn the background sweeper. Runs until the store is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        let period = self.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                store.sweep().await;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
