//! Delegation module - hands conversations to the tool-building service
//!
//! Each user is either `Idle` (absent from the registry) or `InProgress`.
//!
//! ```text
//!            trigger keyword              ask
//!   Idle ─────────────────────> InProgress ──┐
//!    ^                              │  ^      │
//!    │  found / result / error /    │  └──────┘
//!    └──── transport failure ───────┘
//! ```
//!
//! While a user is `InProgress` every message goes to the service's
//! `continue` operation, whatever it contains.

pub mod client;
pub mod protocol;

pub use client::{HttpToolService, ToolService};
pub use protocol::{RawToolResponse, ToolProtocol, ToolResponse};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::DelegationConfig;
use crate::utils::sanitize::sanitize_telegram_html;

/// Default keywords that open a delegation.
pub const DEFAULT_TRIGGERS: &[&str] = &["build", "tool", "generator", "bot", "utility"];

/// Delegation state of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationStatus {
    Idle,
    InProgress,
}

/// Process-wide map of open delegations. A user without an entry is `Idle`.
///
/// # Example
/// ```
/// use ailex::delegation::{DelegationRegistry, DelegationStatus};
///
/// # tokio_test::block_on(async {
/// let registry = DelegationRegistry::new();
/// registry.begin("42").await;
/// assert_eq!(registry.status("42").await, DelegationStatus::InProgress);
///
/// registry.finish("42").await;
/// assert_eq!(registry.status("42").await, DelegationStatus::Idle);
/// # });
/// ```
#[derive(Default)]
pub struct DelegationRegistry {
    entries: RwLock<HashMap<String, DelegationStatus>>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self, user_id: &str) -> DelegationStatus {
        self.entries
            .read()
            .await
            .get(user_id)
            .copied()
            .unwrap_or(DelegationStatus::Idle)
    }

    /// Mark the user `InProgress`.
    pub async fn begin(&self, user_id: &str) {
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), DelegationStatus::InProgress);
    }

    /// Return the user to `Idle` by dropping the entry.
    pub async fn finish(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }

    /// Number of open delegations.
    pub async fn open_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Reply texts used by the state machine.
#[derive(Debug, Clone)]
pub struct DelegationReplies {
    /// Shown when the service cannot be reached or answers garbage.
    pub failure: String,
    /// Heading above the candidate list of a `found` response.
    pub found_header: String,
    /// Shown for a `found` response with no candidates.
    pub nothing_found: String,
}

impl Default for DelegationReplies {
    fn default() -> Self {
        Self {
            failure: "⚠️ Сервис инструментов сейчас недоступен. Попробуй позже.".to_string(),
            found_header: "🔎 Нашёл подходящие инструменты:".to_string(),
            nothing_found: "🔎 Подходящих инструментов не нашлось.".to_string(),
        }
    }
}

/// Routes tool requests to the [`ToolService`] and maps its replies.
pub struct DelegationMachine {
    registry: Arc<DelegationRegistry>,
    service: Arc<dyn ToolService>,
    triggers: Vec<String>,
    replies: DelegationReplies,
}

impl DelegationMachine {
    pub fn new(registry: Arc<DelegationRegistry>, service: Arc<dyn ToolService>) -> Self {
        Self {
            registry,
            service,
            triggers: DEFAULT_TRIGGERS.iter().map(|t| t.to_string()).collect(),
            replies: DelegationReplies::default(),
        }
    }

    /// Build a machine with triggers and replies from the `delegation` config section.
    pub fn from_config(
        config: &DelegationConfig,
        registry: Arc<DelegationRegistry>,
        service: Arc<dyn ToolService>,
    ) -> Self {
        Self::new(registry, service)
            .with_triggers(&config.triggers)
            .with_replies(DelegationReplies {
                failure: config.failure_message.clone(),
                found_header: config.found_header.clone(),
                nothing_found: config.nothing_found_message.clone(),
            })
    }

    /// Replace the trigger keywords (builder pattern). Blank entries are dropped.
    pub fn with_triggers<S: AsRef<str>>(mut self, triggers: &[S]) -> Self {
        self.triggers = triggers
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn with_replies(mut self, replies: DelegationReplies) -> Self {
        self.replies = replies;
        self
    }

    pub fn registry(&self) -> &Arc<DelegationRegistry> {
        &self.registry
    }

    /// Whether `text` contains a trigger keyword (case-insensitive substring).
    pub fn is_tool_request(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.triggers.iter().any(|t| lowered.contains(t.as_str()))
    }

    pub async fn is_delegated(&self, user_id: &str) -> bool {
        self.registry.status(user_id).await == DelegationStatus::InProgress
    }

    /// Forward `text` to the service and return the sanitized reply.
    ///
    /// An `Idle` user opens a delegation via `start`; an `InProgress` user is
    /// routed to `continue`. The entry is removed on every terminal response
    /// and on any failure to talk to the service. A reply that is blank once
    /// sanitized is treated as a failure, so the user always gets some text.
    pub async fn handle(&self, user_id: &str, text: &str) -> String {
        let response = match self.registry.status(user_id).await {
            DelegationStatus::InProgress => {
                info!(component = "delegation", user_id = %user_id, "Continuing delegation");
                self.service.continue_session(user_id, text).await
            }
            DelegationStatus::Idle => {
                info!(component = "delegation", user_id = %user_id, "Starting delegation");
                self.registry.begin(user_id).await;
                self.service.start(user_id, text).await
            }
        };

        match response {
            Ok(response) => {
                info!(
                    component = "delegation",
                    user_id = %user_id,
                    status = response.kind(),
                    "Tool service replied"
                );
                if response.is_terminal() {
                    self.registry.finish(user_id).await;
                }
                let reply = sanitize_telegram_html(&self.render(response));
                if !reply.trim().is_empty() {
                    return reply;
                }
                warn!(
                    component = "delegation",
                    user_id = %user_id,
                    "Tool service reply has no text, closing delegation"
                );
                self.registry.finish(user_id).await;
                self.failure_reply()
            }
            Err(e) => {
                warn!(
                    component = "delegation",
                    user_id = %user_id,
                    "Tool service call failed, closing delegation: {}",
                    e
                );
                self.registry.finish(user_id).await;
                self.failure_reply()
            }
        }
    }

    /// The failure text, or the built-in one when the configured text is blank.
    fn failure_reply(&self) -> String {
        let reply = sanitize_telegram_html(&self.replies.failure);
        if reply.trim().is_empty() {
            DelegationReplies::default().failure
        } else {
            reply
        }
    }

    fn render(&self, response: ToolResponse) -> String {
        match response {
            ToolResponse::Ask(question) => question,
            ToolResponse::Found(candidates) if candidates.is_empty() => {
                self.replies.nothing_found.clone()
            }
            ToolResponse::Found(candidates) => {
                let mut out = self.replies.found_header.clone();
                for candidate in candidates {
                    out.push('\n');
                    out.push_str(crate::utils::sanitize::BULLET);
                    out.push_str(&candidate);
                }
                out
            }
            ToolResponse::Result(text) => text,
            ToolResponse::Error(text) if text.is_empty() => self.replies.failure.clone(),
            ToolResponse::Error(text) => text,
        }
    }
}
