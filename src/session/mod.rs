//! Session module - per-user conversational memory
//!
//! This module provides the in-memory session store for AIlex:
//! - bounded history per user (ring buffer, oldest turn dropped first)
//! - last-activity tracking on every inbound message
//! - idle eviction driven by [`SessionEvictor`]
//!
//! Nothing here fails: a missing session simply means "no history".
//!
//! # Example
//!
//! ```
//! use ailex::session::{Role, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new(10, 1800);
//!
//!     store.touch("user123").await;
//!     store.append_turn("user123", Role::User, "Hello!").await;
//!     store.append_turn("user123", Role::Assistant, "Hi there!").await;
//!
//!     let history = store.snapshot("user123").await;
//!     assert_eq!(history.len(), 2);
//! }
//! ```

pub mod evictor;
pub mod types;

pub use evictor::SessionEvictor;
pub use types::{Message, Role, UserSession, DEFAULT_HISTORY_CAPACITY};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::SessionsConfig;

/// Default idle time after which a session is evicted.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;

type SessionCell = Arc<Mutex<UserSession>>;

/// In-memory store of [`UserSession`]s keyed by sender id.
///
/// # Thread Safety
///
/// The map is guarded by an async `RwLock`; each session's history has its
/// own lock. Mutations of a single session hold the map's read lock while
/// they run, and [`sweep`](Self::sweep) holds the write lock, so an append
/// can never land in a session that is being evicted.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionCell>>,
    capacity: usize,
    idle_timeout: Duration,
}

fn lock_session(cell: &SessionCell) -> MutexGuard<'_, UserSession> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SessionStore {
    /// Create a store retaining `capacity` turns per user and evicting
    /// sessions idle for longer than `idle_timeout_secs`.
    pub fn new(capacity: usize, idle_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            idle_timeout: Duration::seconds(idle_timeout_secs as i64),
        }
    }

    /// Create a store from the `sessions` config section.
    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::new(config.history_capacity, config.idle_timeout_secs)
    }

    /// Record now as the user's last activity, creating the session if absent.
    pub async fn touch(&self, user_id: &str) {
        self.touch_at(user_id, Utc::now()).await;
    }

    /// Record `now` as the user's last activity, creating the session if absent.
    pub async fn touch_at(&self, user_id: &str, now: DateTime<Utc>) {
        {
            let sessions = self.sessions.read().await;
            if let Some(cell) = sessions.get(user_id) {
                lock_session(cell).touch(now);
                return;
            }
        }

        let mut sessions = self.sessions.write().await;
        let cell = sessions.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id = %user_id, "Creating session");
            Arc::new(Mutex::new(UserSession::new(user_id, self.capacity, now)))
        });
        lock_session(cell).touch(now);
    }

    /// Append a turn to the user's history, dropping the oldest turn at capacity.
    ///
    /// A session that does not exist yet is created, active as of now.
    pub async fn append_turn(&self, user_id: &str, role: Role, content: &str) {
        let message = Message::new(role, content);
        {
            let sessions = self.sessions.read().await;
            if let Some(cell) = sessions.get(user_id) {
                lock_session(cell).push(message);
                return;
            }
        }

        let mut sessions = self.sessions.write().await;
        let cell = sessions.entry(user_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(UserSession::new(
                user_id,
                self.capacity,
                Utc::now(),
            )))
        });
        lock_session(cell).push(message);
    }

    /// Copy of the user's history, oldest first. Empty when no session exists.
    pub async fn snapshot(&self, user_id: &str) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|cell| lock_session(cell).history())
            .unwrap_or_default()
    }

    /// Time of the user's latest inbound message, if a session exists.
    pub async fn last_active(&self, user_id: &str) -> Option<DateTime<Utc>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|cell| lock_session(cell).last_active_at)
    }

    /// Remove every session idle for strictly longer than the idle timeout.
    ///
    /// Returns the evicted user ids. A session idle for exactly the timeout
    /// is kept.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let idle_timeout = self.idle_timeout;
        let mut evicted = Vec::new();

        sessions.retain(|user_id, cell| {
            let expired = now - lock_session(cell).last_active_at > idle_timeout;
            if expired {
                evicted.push(user_id.clone());
            }
            !expired
        });

        evicted.sort();
        evicted
    }

    /// Whether a session exists for this user.
    pub async fn contains(&self, user_id: &str) -> bool {
        self.sessions.read().await.contains_key(user_id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Per-user history capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Idle timeout used by [`sweep`](Self::sweep).
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_IDLE_TIMEOUT_SECS)
    }
}
