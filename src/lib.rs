//! AIlex - Telegram assistant for AI and automation topics
//!
//! The bot answers users in private chats and groups with a short rolling
//! memory per user, hands tool-building requests to an external service,
//! and publishes scheduled posts to a channel.
//!
//! # Components
//!
//! - [`channels`]: the Telegram adapter feeding the [`bus`]
//! - [`agent`]: the dispatcher that routes and answers inbound messages
//! - [`session`]: per-user bounded history with idle eviction
//! - [`delegation`]: the per-user state machine for the tool service
//! - [`scheduler`]: periodic posting from curated topics and an RSS feed
//! - [`health`], [`heartbeat`]: liveness endpoint and self-ping

pub mod agent;
pub mod bus;
pub mod channels;
pub mod config;
pub mod delegation;
pub mod error;
pub mod feed;
pub mod health;
pub mod heartbeat;
pub mod providers;
pub mod quality;
pub mod scheduler;
pub mod session;
pub mod supervisor;
pub mod utils;

pub use agent::{Dispatcher, Route};
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::Config;
pub use error::{AilexError, ProviderError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, OpenAIProvider};
pub use scheduler::ContentScheduler;
pub use session::{Message, Role, SessionStore};
