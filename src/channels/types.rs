//! Channel trait and types for AIlex
//!
//! This module defines the `Channel` trait implemented by chat platforms,
//! along with the allowlist configuration shared by channel adapters.

use async_trait::async_trait;

use crate::bus::OutboundMessage;
use crate::error::Result;

/// The `Channel` trait defines the interface of a chat platform.
///
/// Channels are responsible for:
/// - Receiving messages from users and publishing them to the message bus
/// - Delivering outbound messages (replies and scheduled posts)
/// - Managing their connection lifecycle (start/stop)
/// - Enforcing access control via allowlists
///
/// Lifecycle methods take `&self` so one channel can be shared behind an
/// `Arc` by the dispatcher and the content scheduler.
///
/// # Example Implementation
///
/// ```ignore
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use ailex::channels::{Channel, BaseChannelConfig};
/// use ailex::bus::OutboundMessage;
/// use ailex::error::Result;
///
/// struct ConsoleChannel {
///     config: BaseChannelConfig,
///     running: AtomicBool,
/// }
///
/// #[async_trait]
/// impl Channel for ConsoleChannel {
///     fn name(&self) -> &str {
///         &self.config.name
///     }
///
///     async fn start(&self) -> Result<()> {
///         self.running.store(true, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<()> {
///         self.running.store(false, Ordering::SeqCst);
///         Ok(())
///     }
///
///     async fn send(&self, msg: OutboundMessage) -> Result<()> {
///         println!("[{}] {}", msg.chat_id, msg.content);
///         Ok(())
///     }
///
///     fn is_running(&self) -> bool {
///         self.running.load(Ordering::SeqCst)
///     }
///
///     fn is_allowed(&self, user_id: &str) -> bool {
///         self.config.is_allowed(user_id)
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Returns the unique name of this channel (e.g., "telegram").
    fn name(&self) -> &str;

    /// Starts the channel, establishing connections and beginning to listen
    /// for incoming messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel fails to start (e.g., invalid token).
    async fn start(&self) -> Result<()>;

    /// Stops the channel, cleaning up resources and closing connections.
    async fn stop(&self) -> Result<()>;

    /// Sends an outbound message through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails to send (e.g., network failure,
    /// invalid chat ID, rate limiting, etc.).
    async fn send(&self, msg: OutboundMessage) -> Result<()>;

    /// Returns whether the channel is currently running and accepting messages.
    fn is_running(&self) -> bool;

    /// Checks if a user is allowed to use this channel.
    fn is_allowed(&self, user_id: &str) -> bool;
}

/// Base configuration shared by all channels.
///
/// # Example
///
/// ```
/// use ailex::channels::BaseChannelConfig;
///
/// let config = BaseChannelConfig::with_allowlist(
///     "telegram",
///     vec!["user123".to_string(), "user456".to_string()],
/// );
///
/// assert!(config.is_allowed("user123"));
/// assert!(!config.is_allowed("user789"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BaseChannelConfig {
    /// The unique name of this channel
    pub name: String,
    /// List of allowed user IDs. If empty, all users are allowed.
    pub allowlist: Vec<String>,
}

impl BaseChannelConfig {
    /// Creates a config with an empty allowlist (everyone allowed).
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            allowlist: Vec::new(),
        }
    }

    /// Creates a config with the given allowlist.
    pub fn with_allowlist(name: &str, allowlist: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            allowlist,
        }
    }

    /// Checks if a user is allowed based on the allowlist.
    ///
    /// If the allowlist is empty, all users are allowed.
    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowlist.is_empty() || self.allowlist.iter().any(|u| u == user_id)
    }
}
