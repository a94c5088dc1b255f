//! Channels module - chat platform adapters
//!
//! A channel receives messages from users, publishes them to the
//! [`MessageBus`](crate::bus::MessageBus), and delivers outbound messages.
//!
//! ```text
//!  ┌──────────────┐  InboundMessage   ┌────────────┐
//!  │   Telegram   │ ────────────────> │ MessageBus │ ──> Dispatcher
//!  │   Channel    │                   └────────────┘
//!  │              │ <──────────────── Dispatcher / ContentScheduler
//!  └──────────────┘  OutboundMessage
//! ```

pub mod telegram;
mod types;

pub use telegram::TelegramChannel;
pub use types::{BaseChannelConfig, Channel};
