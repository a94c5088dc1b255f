//! Message types for the AIlex message bus
//!
//! Inbound messages travel from a channel adapter to the dispatcher; outbound
//! messages are handed straight to a [`Channel`](crate::channels::Channel)
//! by the dispatcher and the content scheduler.

use serde::{Deserialize, Serialize};

/// Where an inbound message was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatContext {
    /// One-to-one conversation with the bot.
    Direct,
    /// Group or supergroup. `addressed` is set when the bot was mentioned.
    Group { addressed: bool },
}

impl ChatContext {
    /// Whether the bot should consider this message at all.
    ///
    /// Direct messages always are; group messages only when they mention the bot.
    pub fn is_for_bot(&self) -> bool {
        match self {
            ChatContext::Direct => true,
            ChatContext::Group { addressed } => *addressed,
        }
    }

    /// Returns `true` for one-to-one chats.
    pub fn is_direct(&self) -> bool {
        matches!(self, ChatContext::Direct)
    }
}

/// Represents an incoming message from a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "telegram")
    pub channel: String,
    /// Unique identifier of the sender; also the session key
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message, with any bot mention already removed
    pub content: String,
    /// Platform message id, used to thread the reply
    pub message_id: Option<String>,
    /// Direct vs. group origin
    pub context: ChatContext,
}

/// Rendering hint for outbound text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// Send as-is, no markup interpretation.
    #[default]
    Plain,
    /// Telegram HTML subset.
    Html,
}

/// A link-style call-to-action attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    /// Button caption
    pub label: String,
    /// Target URL
    pub url: String,
}

impl Affordance {
    pub fn link(label: &str, url: &str) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
        }
    }
}

/// Represents an outgoing message to be sent via a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Optional message ID to reply to
    pub reply_to: Option<String>,
    /// Optional call-to-action button
    pub affordance: Option<Affordance>,
    /// Markup hint
    pub format: MessageFormat,
}

impl InboundMessage {
    /// Creates a direct-chat inbound message.
    ///
    /// # Example
    /// ```
    /// use ailex::bus::message::{ChatContext, InboundMessage};
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.context, ChatContext::Direct);
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            message_id: None,
            context: ChatContext::Direct,
        }
    }

    /// Sets the chat context (builder pattern).
    pub fn with_context(mut self, context: ChatContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the platform message id (builder pattern).
    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }
}

impl OutboundMessage {
    /// Creates a new plain-text outbound message.
    ///
    /// # Example
    /// ```
    /// use ailex::bus::message::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// assert!(msg.affordance.is_none());
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            affordance: None,
            format: MessageFormat::Plain,
        }
    }

    /// Sets the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Attaches a call-to-action button (builder pattern).
    pub fn with_affordance(mut self, affordance: Affordance) -> Self {
        self.affordance = Some(affordance);
        self
    }

    /// Sets the markup hint (builder pattern).
    pub fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    /// Creates an outbound message answering an inbound one, threaded to it
    /// when the platform message id is known.
    ///
    /// # Example
    /// ```
    /// use ailex::bus::message::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("telegram", "user123", "chat456", "Hello")
    ///     .with_message_id("42");
    /// let response = OutboundMessage::reply_to(&inbound, "Hello back!");
    /// assert_eq!(response.chat_id, "chat456");
    /// assert_eq!(response.reply_to.as_deref(), Some("42"));
    /// ```
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        let mut out = Self::new(&msg.channel, &msg.chat_id, content);
        out.reply_to = msg.message_id.clone();
        out
    }
}
