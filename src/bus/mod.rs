//! Message Bus Module
//!
//! The inbound event source of AIlex. Channel adapters publish
//! [`InboundMessage`]s; the dispatcher consumes them.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Channel   │────>│  MessageBus │────>│ Dispatcher  │
//! │  (Telegram) │     │  (inbound)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ailex::bus::{MessageBus, InboundMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!
//!     let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");
//!     bus.publish_inbound(msg).await.unwrap();
//!
//!     if let Some(received) = bus.consume_inbound().await {
//!         println!("Received: {}", received.content);
//!     }
//! }
//! ```

pub mod message;

pub use message::{Affordance, ChatContext, InboundMessage, MessageFormat, OutboundMessage};

use crate::error::{AilexError, Result};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Default buffer size for the inbound queue
const DEFAULT_BUFFER_SIZE: usize = 100;

/// Inbound message queue shared by channel adapters and the dispatcher.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
}

impl MessageBus {
    /// Creates a new `MessageBus` with the default buffer size (100).
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a new `MessageBus` with a custom buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    /// Publishes an inbound message to the bus.
    ///
    /// # Errors
    /// Returns `AilexError::BusClosed` if the receiver has been dropped.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| AilexError::BusClosed)
    }

    /// Waits for the next inbound message.
    ///
    /// The bus owns a sender itself, so the queue never closes while the bus
    /// is alive and this only resolves with `Some`.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_inbound_flow() {
        let bus = MessageBus::new();
        let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello");

        bus.publish_inbound(msg).await.unwrap();
        let received = bus.consume_inbound().await.unwrap();

        assert_eq!(received.content, "Hello");
        assert_eq!(received.sender_id, "user123");
        assert_eq!(received.chat_id, "chat456");
    }

    #[tokio::test]
    async fn test_bus_preserves_order() {
        let bus = MessageBus::new();
        for i in 0..5 {
            let msg = InboundMessage::new("telegram", "u", "c", &format!("m{}", i));
            bus.publish_inbound(msg).await.unwrap();
        }
        for i in 0..5 {
            let received = bus.consume_inbound().await.unwrap();
            assert_eq!(received.content, format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn test_consume_waits_on_empty_bus() {
        let bus = MessageBus::new();
        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(50), bus.consume_inbound())
                .await;
        assert!(waited.is_err());
    }
}
