//! Session types for AIlex
//!
//! A [`UserSession`] is the short conversational memory kept for one user:
//! the last few turns in arrival order plus the time of their latest message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of turns retained per user.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Conversation memory for a single user.
///
/// The history behaves as a ring buffer: once `capacity` turns are stored,
/// appending a new one drops the oldest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    /// Sender identifier this session belongs to
    pub user_id: String,
    /// Retained turns, oldest first
    history: VecDeque<Message>,
    /// Maximum number of retained turns
    capacity: usize,
    /// Time of the latest inbound message from this user
    pub last_active_at: DateTime<Utc>,
}

impl UserSession {
    /// Create an empty session, active as of `now`.
    ///
    /// # Example
    /// ```
    /// use ailex::session::UserSession;
    /// use chrono::Utc;
    ///
    /// let session = UserSession::new("42", 10, Utc::now());
    /// assert!(session.is_empty());
    /// ```
    pub fn new(user_id: &str, capacity: usize, now: DateTime<Utc>) -> Self {
        let capacity = capacity.max(1);
        Self {
            user_id: user_id.to_string(),
            history: VecDeque::with_capacity(capacity),
            capacity,
            last_active_at: now,
        }
    }

    /// Append a turn, evicting the oldest one when full.
    ///
    /// # Example
    /// ```
    /// use ailex::session::{Message, UserSession};
    /// use chrono::Utc;
    ///
    /// let mut session = UserSession::new("42", 2, Utc::now());
    /// session.push(Message::user("one"));
    /// session.push(Message::user("two"));
    /// session.push(Message::user("three"));
    /// assert_eq!(session.len(), 2);
    /// assert_eq!(session.history()[0].content, "two");
    /// ```
    pub fn push(&mut self, message: Message) {
        while self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }

    /// Record inbound activity.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
    }

    /// Copy of the retained turns, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author
    pub role: Role,
    /// The text content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use ailex::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    ///
    /// System messages carry the persona framing and are never stored in
    /// a session's history.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, content)
    }

    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// The human participant
    User,
    /// AIlex
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}
