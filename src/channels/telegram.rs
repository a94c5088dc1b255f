//! Telegram Channel Implementation
//!
//! Telegram bot channel for AIlex using teloxide long polling.
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐
//! │   Telegram API   │ <────── │  TelegramChannel │
//! │                  │ ──────> │   (teloxide)     │
//! └──────────────────┘         └────────┬─────────┘
//!                                       │ InboundMessage
//!                                       ▼
//!                              ┌──────────────────┐
//!                              │    MessageBus    │
//!                              └──────────────────┘
//! ```
//!
//! In group chats a message counts as addressed to the bot only when it
//! contains `@<bot username>`; the mention is removed from the text before
//! the message is published.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::bus::{ChatContext, InboundMessage, MessageBus, MessageFormat, OutboundMessage};
use crate::config::TelegramConfig;
use crate::error::{AilexError, Result};
use crate::utils::sanitize::html_to_plain;

use super::{BaseChannelConfig, Channel};

/// Maximum number of startup connectivity retries before giving up.
const MAX_STARTUP_RETRIES: u32 = 10;
/// Base delay (in seconds) for exponential backoff on startup retries.
const BASE_RETRY_DELAY_SECS: u64 = 2;
/// Maximum delay (in seconds) for exponential backoff on startup retries.
const MAX_RETRY_DELAY_SECS: u64 = 120;

/// The bot's own username, injected into the update handler.
#[derive(Debug, Clone, Default)]
struct BotUsername(String);

/// Telegram channel implementation using teloxide.
pub struct TelegramChannel {
    config: TelegramConfig,
    base_config: Arc<BaseChannelConfig>,
    bus: Arc<MessageBus>,
    running: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    bot: teloxide::Bot,
}

impl TelegramChannel {
    /// Creates a new Telegram channel.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client for the Bot API cannot be built.
    pub fn new(config: TelegramConfig, bus: Arc<MessageBus>) -> Result<Self> {
        let bot = Self::build_bot(&config.token)?;
        let base_config = Arc::new(BaseChannelConfig::with_allowlist(
            "telegram",
            config.allow_from.clone(),
        ));
        Ok(Self {
            config,
            base_config,
            bus,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Mutex::new(None),
            bot,
        })
    }

    /// Calculates the exponential backoff delay for a startup retry attempt.
    fn startup_backoff_delay(attempt: u32) -> Duration {
        let delay_secs = BASE_RETRY_DELAY_SECS
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(MAX_RETRY_DELAY_SECS);
        Duration::from_secs(delay_secs)
    }

    /// Build a Telegram bot client without system proxy detection.
    fn build_bot(token: &str) -> Result<teloxide::Bot> {
        let client = teloxide::net::default_reqwest_settings()
            .no_proxy()
            .build()
            .map_err(|e| {
                AilexError::Channel(format!("Failed to build Telegram HTTP client: {}", e))
            })?;
        Ok(teloxide::Bot::with_client(token.to_string(), client))
    }

    /// Work out the chat context of a message and the text to publish.
    ///
    /// Returns the context and the text with the bot mention removed and
    /// surrounding whitespace trimmed. Mentions are matched case-insensitively.
    fn resolve_context(is_private: bool, text: &str, bot_username: &str) -> (ChatContext, String) {
        if is_private {
            return (ChatContext::Direct, text.trim().to_string());
        }
        if bot_username.is_empty() {
            return (ChatContext::Group { addressed: false }, text.trim().to_string());
        }

        let mention = format!("@{}", bot_username).to_ascii_lowercase();
        let lowered = text.to_ascii_lowercase();
        let mut stripped = String::with_capacity(text.len());
        let mut last = 0;
        let mut addressed = false;
        for (idx, _) in lowered.match_indices(&mention) {
            addressed = true;
            stripped.push_str(&text[last..idx]);
            last = idx + mention.len();
        }
        stripped.push_str(&text[last..]);

        (ChatContext::Group { addressed }, stripped.trim().to_string())
    }

    /// Text for one send attempt: the HTML as is, or its plain rendering.
    fn outgoing_text(content: &str, html: bool) -> String {
        if html {
            content.to_string()
        } else {
            html_to_plain(content)
        }
    }

    async fn deliver(&self, msg: &OutboundMessage, chat_id: i64, html: bool) -> Result<()> {
        use teloxide::prelude::*;
        use teloxide::types::{
            InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode, ReplyParameters,
        };

        let mut request = self
            .bot
            .send_message(ChatId(chat_id), Self::outgoing_text(&msg.content, html));

        if html {
            request = request.parse_mode(ParseMode::Html);
        }

        if let Some(reply_to) = msg.reply_to.as_deref().and_then(|id| id.parse::<i32>().ok()) {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }

        if let Some(ref affordance) = msg.affordance {
            let url = reqwest::Url::parse(&affordance.url).map_err(|e| {
                AilexError::Channel(format!("Invalid button URL {}: {}", affordance.url, e))
            })?;
            request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![
                InlineKeyboardButton::url(affordance.label.clone(), url),
            ]]));
        }

        request
            .await
            .map(|_| ())
            .map_err(|e| AilexError::Channel(format!("Failed to send Telegram message: {}", e)))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    /// Starts the Telegram bot polling loop in a background task.
    ///
    /// Returns immediately. Polling errors are logged and do not stop the
    /// channel; a panic in the polling task is caught and marks the channel
    /// as stopped.
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Telegram channel already running");
            return Ok(());
        }

        if !self.config.enabled {
            warn!("Telegram channel is disabled in configuration");
            self.running.store(false, Ordering::SeqCst);
            return Ok(());
        }

        if self.config.token.is_empty() {
            error!("Telegram bot token is empty");
            self.running.store(false, Ordering::SeqCst);
            return Err(AilexError::Config("Telegram bot token is empty".into()));
        }

        info!("Starting Telegram channel");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let bot = self.bot.clone();
        let bus = Arc::clone(&self.bus);
        let base_config = Arc::clone(&self.base_config);
        let running_clone = Arc::clone(&self.running);

        tokio::spawn(async move {
            use teloxide::prelude::*;

            let task_result = std::panic::AssertUnwindSafe(async move {
                // Transient failures (network not ready) are retried with
                // backoff; anything else bails on the first attempt.
                let mut attempt: u32 = 0;
                let me = loop {
                    match bot.get_me().await {
                        Ok(me) => break me,
                        Err(e) => {
                            use teloxide::RequestError;

                            let is_transient = matches!(
                                &e,
                                RequestError::Network(_)
                                    | RequestError::Io(_)
                                    | RequestError::RetryAfter(_)
                            );

                            if !is_transient || attempt >= MAX_STARTUP_RETRIES {
                                error!(
                                    "Telegram startup check failed after {} attempt(s): {}",
                                    attempt + 1,
                                    e
                                );
                                return;
                            }

                            let delay = if let RequestError::RetryAfter(d) = &e {
                                d.duration()
                            } else {
                                TelegramChannel::startup_backoff_delay(attempt)
                            };
                            warn!(
                                "Telegram startup check failed (attempt {}/{}), retrying in {}s: {}",
                                attempt + 1,
                                MAX_STARTUP_RETRIES,
                                delay.as_secs(),
                                e
                            );
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!("Telegram channel shutdown during startup retry");
                                    return;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                            attempt += 1;
                        }
                    }
                };

                let username = BotUsername(me.user.username.clone().unwrap_or_default());
                info!("Telegram bot authorized as @{}", username.0);

                let handler = Update::filter_message().endpoint(
                    |msg: Message,
                     bus: Arc<MessageBus>,
                     base_config: Arc<BaseChannelConfig>,
                     username: BotUsername| async move {
                        let user_id = msg
                            .from
                            .as_ref()
                            .map(|u| u.id.0.to_string())
                            .unwrap_or_else(|| "unknown".to_string());

                        if !base_config.is_allowed(&user_id) {
                            info!(
                                "Telegram: User {} not in allowlist, ignoring message",
                                user_id
                            );
                            return Ok(());
                        }

                        if let Some(text) = msg.text() {
                            let chat_id = msg.chat.id.0.to_string();
                            let (context, content) = TelegramChannel::resolve_context(
                                msg.chat.is_private(),
                                text,
                                &username.0,
                            );

                            info!(
                                component = "telegram",
                                user_id = %user_id,
                                chat_id = %chat_id,
                                "Received message ({} chars)",
                                content.chars().count()
                            );

                            let inbound = InboundMessage::new("telegram", &user_id, &chat_id, &content)
                                .with_context(context)
                                .with_message_id(&msg.id.0.to_string());

                            if let Err(e) = bus.publish_inbound(inbound).await {
                                error!("Failed to publish inbound message to bus: {}", e);
                            }
                        }

                        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                    },
                );

                let mut dispatcher = Dispatcher::builder(bot, handler)
                    .dependencies(dptree::deps![bus, base_config, username])
                    .build();

                info!("Telegram bot dispatcher started, waiting for messages...");

                tokio::select! {
                    _ = dispatcher.dispatch() => {
                        info!("Telegram dispatcher completed");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Telegram channel shutdown signal received");
                    }
                }
            })
            .catch_unwind()
            .await;

            if task_result.is_err() {
                error!("Telegram polling task panicked");
            }

            running_clone.store(false, Ordering::SeqCst);
            info!("Telegram polling task stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            info!("Telegram channel already stopped");
            return Ok(());
        }

        info!("Stopping Telegram channel");

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            if tx.send(()).await.is_err() {
                warn!("Telegram shutdown channel already closed");
            }
        }

        info!("Telegram channel stopped");
        Ok(())
    }

    /// Sends an outbound message to a Telegram chat.
    ///
    /// HTML messages rejected by Telegram are retried once as plain text
    /// with the tags stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The channel is not running
    /// - The chat_id cannot be parsed as an integer
    /// - The Telegram API request fails
    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Telegram channel not running, cannot send message");
            return Err(AilexError::Channel(
                "Telegram channel not running".to_string(),
            ));
        }

        let chat_id: i64 = msg.chat_id.parse().map_err(|_| {
            AilexError::Channel(format!("Invalid Telegram chat ID: {}", msg.chat_id))
        })?;

        let html = msg.format == MessageFormat::Html;
        match self.deliver(&msg, chat_id, html).await {
            Ok(()) => {}
            Err(e) if html => {
                warn!(
                    component = "telegram",
                    chat_id,
                    "HTML send failed, retrying as plain text: {}",
                    e
                );
                self.deliver(&msg, chat_id, false).await?;
            }
            Err(e) => return Err(e),
        }

        info!(component = "telegram", chat_id, "Message sent");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_allowed(&self, user_id: &str) -> bool {
        self.base_config.is_allowed(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(config: TelegramConfig) -> TelegramChannel {
        TelegramChannel::new(config, Arc::new(MessageBus::new())).unwrap()
    }

    fn config(enabled: bool, token: &str, allow_from: Vec<String>) -> TelegramConfig {
        TelegramConfig {
            enabled,
            token: token.to_string(),
            allow_from,
        }
    }

    #[test]
    fn test_telegram_channel_creation() {
        let channel = channel(config(true, "test-token", vec!["user1".to_string()]));
        assert_eq!(channel.name(), "telegram");
        assert!(!channel.is_running());
        assert!(channel.is_allowed("user1"));
        assert!(!channel.is_allowed("user2"));
    }

    #[test]
    fn test_plain_fallback_text_is_unescaped() {
        let content = "<b>R&amp;D</b>: 1 &lt; 2";
        assert_eq!(TelegramChannel::outgoing_text(content, true), content);
        assert_eq!(TelegramChannel::outgoing_text(content, false), "R&D: 1 < 2");
    }

    #[test]
    fn test_telegram_empty_allowlist() {
        let channel = channel(config(true, "test-token", vec![]));
        assert!(channel.is_allowed("anyone"));
    }

    #[tokio::test]
    async fn test_telegram_start_without_token() {
        let channel = channel(config(true, "", vec![]));
        assert!(channel.start().await.is_err());
        assert!(!channel.is_running());
    }

    #[tokio::test]
    async fn test_telegram_start_disabled() {
        let channel = channel(config(false, "test-token", vec![]));
        assert!(channel.start().await.is_ok());
        assert!(!channel.is_running());
    }

    #[tokio::test]
    async fn test_telegram_stop_not_running() {
        let channel = channel(config(true, "test-token", vec![]));
        assert!(channel.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_telegram_send_not_running() {
        let channel = channel(config(true, "test-token", vec![]));
        let msg = OutboundMessage::new("telegram", "12345", "Hello");
        assert!(channel.send(msg).await.is_err());
    }

    #[test]
    fn test_resolve_context_private() {
        let (ctx, text) = TelegramChannel::resolve_context(true, "  hi there ", "AIlexBot");
        assert_eq!(ctx, ChatContext::Direct);
        assert_eq!(text, "hi there");
    }

    #[test]
    fn test_resolve_context_group_mention_stripped() {
        let (ctx, text) =
            TelegramChannel::resolve_context(false, "@ailexbot что нового в ИИ?", "AIlexBot");
        assert_eq!(ctx, ChatContext::Group { addressed: true });
        assert_eq!(text, "что нового в ИИ?");
    }

    #[test]
    fn test_resolve_context_group_mention_in_middle() {
        let (ctx, text) =
            TelegramChannel::resolve_context(false, "hey @AIlexBot, help", "AIlexBot");
        assert_eq!(ctx, ChatContext::Group { addressed: true });
        assert_eq!(text, "hey , help");
    }

    #[test]
    fn test_resolve_context_group_not_addressed() {
        let (ctx, text) = TelegramChannel::resolve_context(false, "just chatting", "AIlexBot");
        assert_eq!(ctx, ChatContext::Group { addressed: false });
        assert_eq!(text, "just chatting");
    }

    #[test]
    fn test_startup_backoff_delay_increases() {
        assert_eq!(
            TelegramChannel::startup_backoff_delay(0),
            Duration::from_secs(2)
        );
        assert_eq!(
            TelegramChannel::startup_backoff_delay(1),
            Duration::from_secs(4)
        );
        assert_eq!(
            TelegramChannel::startup_backoff_delay(2),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn test_startup_backoff_delay_caps_at_max() {
        assert_eq!(
            TelegramChannel::startup_backoff_delay(u32::MAX),
            Duration::from_secs(MAX_RETRY_DELAY_SECS)
        );
    }
}
