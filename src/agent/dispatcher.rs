//! Inbound message dispatcher.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, MessageFormat, OutboundMessage};
use crate::channels::Channel;
use crate::config::{Config, PersonaConfig};
use crate::delegation::DelegationMachine;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, Role, SessionStore};
use crate::utils::sanitize::{normalize_markup, sanitize_telegram_html};

/// Command that opens a conversation.
pub const START_COMMAND: &str = "/start";

/// How an inbound message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not for the bot: a group message without a mention, an empty text,
    /// or `/start` outside a direct chat.
    Ignore,
    /// `/start` in a direct chat.
    Start,
    /// Belongs to the tool-building service.
    Delegated,
    /// Ordinary chat turn answered by text generation.
    Plain,
}

fn is_start_command(text: &str) -> bool {
    let Some(first) = text.split_whitespace().next() else {
        return false;
    };
    let command = first.split('@').next().unwrap_or(first);
    command.eq_ignore_ascii_case(START_COMMAND)
}

/// Routes inbound messages to sessions, delegation and text generation, and
/// answers through the channel.
///
/// Messages of one user are handled strictly one at a time; different users
/// are handled concurrently.
pub struct Dispatcher {
    sessions: Arc<SessionStore>,
    delegation: Option<Arc<DelegationMachine>>,
    provider: Arc<dyn LLMProvider>,
    channel: Arc<dyn Channel>,
    persona: PersonaConfig,
    model: Option<String>,
    options: ChatOptions,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Pending bus messages per user, drained in receipt order by one worker.
    user_queues: StdMutex<HashMap<String, mpsc::UnboundedSender<InboundMessage>>>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionStore>,
        provider: Arc<dyn LLMProvider>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        Self {
            sessions,
            delegation: None,
            provider,
            channel,
            persona: PersonaConfig::default(),
            model: None,
            options: ChatOptions::default(),
            user_locks: Mutex::new(HashMap::new()),
            user_queues: StdMutex::new(HashMap::new()),
        }
    }

    /// Build a dispatcher from the full configuration.
    pub fn from_config(
        config: &Config,
        sessions: Arc<SessionStore>,
        provider: Arc<dyn LLMProvider>,
        channel: Arc<dyn Channel>,
    ) -> Self {
        let mut options = ChatOptions::new();
        if let Some(max_tokens) = config.provider.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = config.provider.temperature {
            options = options.with_temperature(temperature);
        }
        Self::new(sessions, provider, channel)
            .with_persona(config.persona.clone())
            .with_options(options)
    }

    pub fn with_delegation(mut self, delegation: Arc<DelegationMachine>) -> Self {
        self.delegation = Some(delegation);
        self
    }

    pub fn with_persona(mut self, persona: PersonaConfig) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Decide how `msg` is handled.
    ///
    /// An open delegation is checked before the trigger keywords, so a user
    /// in the middle of a hand-off is never answered by the chat path.
    pub async fn classify(&self, msg: &InboundMessage) -> Route {
        if !msg.context.is_for_bot() {
            return Route::Ignore;
        }
        let text = msg.content.trim();
        if text.is_empty() {
            return Route::Ignore;
        }
        if is_start_command(text) {
            return if msg.context.is_direct() {
                Route::Start
            } else {
                Route::Ignore
            };
        }
        if let Some(delegation) = &self.delegation {
            if delegation.is_delegated(&msg.sender_id).await || delegation.is_tool_request(text)
            {
                return Route::Delegated;
            }
        }
        Route::Plain
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_user_lock(&self, user_id: &str) {
        let mut locks = self.user_locks.lock().await;
        if let Some(lock) = locks.get(user_id) {
            // Only the map still holds it: nobody is waiting on this user.
            if Arc::strong_count(lock) == 1 {
                locks.remove(user_id);
            }
        }
    }

    /// Produce the reply for `msg` without sending it.
    ///
    /// Returns `None` for ignored messages.
    pub async fn respond(&self, msg: &InboundMessage) -> Option<OutboundMessage> {
        let user_id = msg.sender_id.as_str();
        let lock = self.user_lock(user_id).await;
        let reply = {
            let _guard = lock.lock().await;
            self.respond_locked(msg).await
        };
        drop(lock);
        self.release_user_lock(user_id).await;
        reply
    }

    async fn respond_locked(&self, msg: &InboundMessage) -> Option<OutboundMessage> {
        let route = self.classify(msg).await;
        debug!(component = "dispatcher", route = ?route, "Classified message");
        if route == Route::Ignore {
            return None;
        }

        let user_id = msg.sender_id.as_str();
        let text = msg.content.trim();
        self.sessions.touch(user_id).await;

        match route {
            Route::Ignore => None,
            Route::Start => {
                info!(component = "dispatcher", "Greeting new user");
                Some(OutboundMessage::reply_to(msg, &self.persona.greeting))
            }
            Route::Delegated => {
                let delegation = self.delegation.as_ref()?;
                let reply = delegation.handle(user_id, text).await;
                Some(OutboundMessage::reply_to(msg, &reply).with_format(MessageFormat::Html))
            }
            Route::Plain => Some(self.chat(msg, user_id, text).await),
        }
    }

    async fn chat(&self, msg: &InboundMessage, user_id: &str, text: &str) -> OutboundMessage {
        self.sessions.append_turn(user_id, Role::User, text).await;

        let history = self.sessions.snapshot(user_id).await;
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.persona.system_prompt.is_empty() {
            messages.push(Message::system(&self.persona.system_prompt));
        }
        messages.extend(history);

        match self
            .provider
            .chat(messages, self.model.as_deref(), self.options.clone())
            .await
        {
            Ok(response) => {
                if let Some(usage) = response.usage {
                    debug!(
                        component = "dispatcher",
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        total_tokens = usage.total_tokens,
                        "Reply generated"
                    );
                }
                let reply = normalize_markup(&response.content);
                self.sessions
                    .append_turn(user_id, Role::Assistant, &reply)
                    .await;
                OutboundMessage::reply_to(msg, &sanitize_telegram_html(&reply))
                    .with_format(MessageFormat::Html)
            }
            Err(e) => {
                warn!(
                    component = "dispatcher",
                    user_id = %user_id,
                    "Reply generation failed: {}",
                    e
                );
                OutboundMessage::reply_to(msg, &self.persona.apology)
            }
        }
    }

    /// Handle one message end to end: classify, answer, send.
    pub async fn handle(&self, msg: InboundMessage) {
        let span = info_span!(
            "message",
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            sender = %msg.sender_id,
        );
        async {
            let Some(reply) = self.respond(&msg).await else {
                return;
            };
            if let Err(e) = self.channel.send(reply).await {
                error!(component = "dispatcher", "Failed to send reply: {}", e);
            }
        }
        .instrument(span)
        .await;
    }

    /// Queue `msg` behind earlier messages of the same user.
    ///
    /// A user with nothing pending gets a fresh queue and a worker task; the
    /// worker handles messages one by one and removes the queue once it is
    /// drained. Enqueue and removal happen under the same lock, so no message
    /// is left behind in a queue nobody reads.
    fn enqueue(self: &Arc<Self>, msg: InboundMessage) {
        let user_id = msg.sender_id.clone();
        let mut queues = self
            .user_queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let msg = match queues.get(&user_id) {
            Some(tx) => match tx.send(msg) {
                Ok(()) => return,
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(msg).is_err() {
            return;
        }
        queues.insert(user_id.clone(), tx);
        drop(queues);

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move { dispatcher.drain_user(user_id, rx).await });
    }

    async fn drain_user(&self, user_id: String, mut rx: mpsc::UnboundedReceiver<InboundMessage>) {
        loop {
            let next = {
                let mut queues = self
                    .user_queues
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match rx.try_recv() {
                    Ok(msg) => Some(msg),
                    Err(_) => {
                        queues.remove(&user_id);
                        None
                    }
                }
            };
            let Some(msg) = next else {
                break;
            };
            if AssertUnwindSafe(self.handle(msg)).catch_unwind().await.is_err() {
                error!(component = "dispatcher", user_id = %user_id, "Message handler panicked");
            }
        }
    }

    /// Consume the bus until `shutdown` flips to `true`.
    ///
    /// Different users are handled concurrently, so a slow reply for one user
    /// does not hold up the others. Messages of one user are handled in the
    /// order they were received.
    pub async fn run(self: Arc<Self>, bus: Arc<MessageBus>, mut shutdown: watch::Receiver<bool>) {
        info!(component = "dispatcher", "Dispatcher started");
        loop {
            tokio::select! {
                msg = bus.consume_inbound() => {
                    if let Some(msg) = msg {
                        self.enqueue(msg);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(component = "dispatcher", "Dispatcher stopped");
    }
}
