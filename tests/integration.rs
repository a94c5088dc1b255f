//! Integration tests for AIlex
//!
//! These tests drive several components together through the public API:
//! session memory and eviction, the dispatcher with delegation, the content
//! scheduler rotation and the quality gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ailex::agent::{Dispatcher, Route};
use ailex::bus::{InboundMessage, MessageBus, MessageFormat, OutboundMessage};
use ailex::channels::Channel;
use ailex::config::{Config, PersonaConfig};
use ailex::delegation::{DelegationMachine, DelegationRegistry, HttpToolService};
use ailex::feed::FeedFetcher;
use ailex::providers::{ChatOptions, LLMProvider, LLMResponse};
use ailex::quality::{QualityGate, Verdict};
use ailex::scheduler::{ContentScheduler, CycleOutcome, SchedulerState, TopicSource};
use ailex::session::{Message, Role, SessionEvictor, SessionStore};
use ailex::{AilexError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

// ============================================================================
// Test doubles
// ============================================================================

const LONG_POST: &str = "Автоматизация рутинных задач помогает командам сосредоточиться \
    на важном, а небольшие боты и скрипты экономят часы каждую неделю и снижают \
    количество ошибок в повседневной работе";

struct CannedProvider {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl CannedProvider {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LLMProvider for CannedProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(text) => Ok(LLMResponse::text(text)),
            None => Err(AilexError::ToolService("generation unavailable".into())),
        }
    }

    fn default_model(&self) -> &str {
        "canned"
    }

    fn name(&self) -> &str {
        "canned"
    }
}

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingChannel {
    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "telegram"
    }
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }
    fn is_running(&self) -> bool {
        true
    }
    fn is_allowed(&self, _user_id: &str) -> bool {
        true
    }
}

struct StaticFeed(Vec<String>);

#[async_trait]
impl FeedFetcher for StaticFeed {
    async fn fetch_titles(&self) -> Vec<String> {
        self.0.clone()
    }
}

fn persona() -> PersonaConfig {
    PersonaConfig {
        system_prompt: "You are AIlex.".into(),
        post_prompt: "Write a post.".into(),
        apology: "⚠️ Ошибка генерации".into(),
        greeting: "Привет!".into(),
    }
}

/// Minimal tool service: `/start` asks a question, `/continue` returns a result.
async fn spawn_tool_service() -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let paths = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&paths);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            let request = String::from_utf8_lossy(&buf).to_string();
            let path = request
                .split_whitespace()
                .nth(1)
                .unwrap_or_default()
                .to_string();
            seen.lock().unwrap().push(path.clone());

            let body = if path == "/start" {
                r#"{"status":"ask","message":"Для какой платформы нужен бот?"}"#
            } else {
                r#"{"status":"result","result":"Готово: <b>бот</b> собран"}"#
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}", addr), paths)
}

// ============================================================================
// Session memory
// ============================================================================

#[tokio::test]
async fn test_history_keeps_last_ten_turns() {
    let store = SessionStore::new(10, 1800);
    for i in 0..12 {
        store
            .append_turn("42", Role::User, &format!("turn {}", i))
            .await;
    }

    let history = store.snapshot("42").await;
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].content, "turn 2");
    assert_eq!(history[9].content, "turn 11");
}

#[tokio::test]
async fn test_sweep_boundary_is_strictly_greater_than_timeout() {
    let store = SessionStore::new(10, 1800);
    let start = Utc::now();
    store.touch_at("kept", start).await;
    store.touch_at("evicted", start - ChronoDuration::seconds(1)).await;

    let evicted = store.sweep(start + ChronoDuration::seconds(1800)).await;

    assert_eq!(evicted, vec!["evicted".to_string()]);
    assert!(store.contains("kept").await);
    assert!(!store.contains("evicted").await);
}

#[tokio::test]
async fn test_evictor_stops_on_shutdown() {
    let store = Arc::new(SessionStore::new(10, 1800));
    store.touch("1").await;
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(SessionEvictor::new(Arc::clone(&store), 1).run(rx));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("evictor should stop")
        .unwrap();
    assert!(store.contains("1").await);
}

// ============================================================================
// Dispatcher
// ============================================================================

#[tokio::test]
async fn test_hi_end_to_end_through_bus() {
    let provider = CannedProvider::replying("Привет! Чем помочь?");
    let channel = Arc::new(RecordingChannel::default());
    let sessions = Arc::new(SessionStore::new(10, 1800));
    let dispatcher = Arc::new(
        Dispatcher::new(Arc::clone(&sessions), provider.clone(), channel.clone())
            .with_persona(persona()),
    );

    let bus = Arc::new(MessageBus::new());
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&dispatcher).run(Arc::clone(&bus), rx));

    bus.publish_inbound(InboundMessage::new("telegram", "100", "100", "hi"))
        .await
        .unwrap();
    for _ in 0..50 {
        if !channel.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, "100");
    assert_eq!(sent[0].content, "Привет! Чем помочь?");

    let history = sessions.snapshot("100").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "hi");
    assert_eq!(history[1].role, Role::Assistant);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("dispatcher should stop")
        .unwrap();
}

#[tokio::test]
async fn test_generation_failure_replies_with_apology() {
    let channel = Arc::new(RecordingChannel::default());
    let sessions = Arc::new(SessionStore::new(10, 1800));
    let dispatcher = Dispatcher::new(
        Arc::clone(&sessions),
        CannedProvider::failing(),
        channel.clone(),
    )
    .with_persona(persona());

    dispatcher
        .handle(InboundMessage::new("telegram", "5", "5", "hello"))
        .await;

    let sent = channel.sent();
    assert_eq!(sent[0].content, "⚠️ Ошибка генерации");
    assert_eq!(sessions.snapshot("5").await.len(), 1);
}

#[tokio::test]
async fn test_delegation_ask_then_continue_over_http() {
    let (base_url, paths) = spawn_tool_service().await;
    let service = HttpToolService::new(&base_url, 5).unwrap();
    let registry = Arc::new(DelegationRegistry::new());
    let machine = Arc::new(DelegationMachine::new(
        Arc::clone(&registry),
        Arc::new(service),
    ));

    let provider = CannedProvider::replying("unused");
    let channel = Arc::new(RecordingChannel::default());
    let sessions = Arc::new(SessionStore::new(10, 1800));
    let dispatcher = Dispatcher::new(Arc::clone(&sessions), provider.clone(), channel.clone())
        .with_persona(persona())
        .with_delegation(Arc::clone(&machine));

    dispatcher
        .handle(InboundMessage::new("telegram", "77", "77", "Сделай мне bot"))
        .await;
    assert!(machine.is_delegated("77").await);

    // Contains no trigger word, still routed to the open delegation.
    let follow_up = InboundMessage::new("telegram", "77", "77", "для Telegram");
    assert_eq!(dispatcher.classify(&follow_up).await, Route::Delegated);
    dispatcher.handle(follow_up).await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].content, "Для какой платформы нужен бот?");
    assert_eq!(sent[1].content, "Готово: <b>бот</b> собран");
    assert_eq!(sent[1].format, MessageFormat::Html);

    assert_eq!(
        paths.lock().unwrap().clone(),
        vec!["/start".to_string(), "/continue".to_string()]
    );
    assert!(!machine.is_delegated("77").await);
    assert_eq!(registry.open_count().await, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert!(sessions.snapshot("77").await.is_empty());
}

#[tokio::test]
async fn test_unreachable_tool_service_closes_delegation() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let service = HttpToolService::new(&format!("http://{}", addr), 2).unwrap();
    let machine = DelegationMachine::new(Arc::new(DelegationRegistry::new()), Arc::new(service));

    let reply = machine.handle("3", "нужен tool для отчётов").await;
    assert!(!reply.is_empty());
    assert!(!machine.is_delegated("3").await);
}

// ============================================================================
// Content scheduler
// ============================================================================

fn scheduler(
    curated: Vec<&str>,
    feed: Vec<&str>,
    provider: Arc<CannedProvider>,
) -> (ContentScheduler, Arc<RecordingChannel>) {
    let channel = Arc::new(RecordingChannel::default());
    let feed = Arc::new(StaticFeed(feed.into_iter().map(String::from).collect()));
    let scheduler = ContentScheduler::new(
        curated.into_iter().map(String::from).collect(),
        feed,
        provider,
        channel.clone(),
        "-1001",
    )
    .with_post_prompt("Write a post.");
    (scheduler, channel)
}

#[tokio::test]
async fn test_first_curated_cycle_advances_rotation() {
    let (mut sched, channel) = scheduler(
        vec!["Боты для бизнеса", "AI в маркетинге"],
        vec!["Headline"],
        CannedProvider::replying(LONG_POST),
    );

    let outcome = sched.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Published(ref t) if t.source == TopicSource::Curated));
    assert_eq!(
        sched.state(),
        SchedulerState {
            curated_index: 1,
            feed_index: 0,
            use_curated: false,
        }
    );
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat_id, "-1001");
}

#[tokio::test]
async fn test_sources_alternate_even_when_feed_is_empty() {
    let (mut sched, channel) = scheduler(
        vec!["A", "B"],
        vec![],
        CannedProvider::replying(LONG_POST),
    );

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(sched.run_cycle().await);
    }

    assert!(matches!(outcomes[0], CycleOutcome::Published(_)));
    assert_eq!(outcomes[1], CycleOutcome::NoTopic(TopicSource::Feed));
    assert!(matches!(outcomes[2], CycleOutcome::Published(_)));
    assert_eq!(outcomes[3], CycleOutcome::NoTopic(TopicSource::Feed));

    let state = sched.state();
    assert_eq!(state.curated_index, 2);
    assert_eq!(state.feed_index, 0);
    assert!(state.use_curated);
    assert_eq!(channel.sent().len(), 2);
}

#[tokio::test]
async fn test_rejected_post_is_not_published() {
    let (mut sched, channel) = scheduler(
        vec!["A"],
        vec![],
        CannedProvider::replying("Извините, не могу написать пост."),
    );

    let outcome = sched.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Rejected(_)));
    assert!(!outcome.is_failure());
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn test_scheduler_from_default_config_uses_curated_topics() {
    let config = Config::default();
    let channel = Arc::new(RecordingChannel::default());
    let mut sched = ContentScheduler::from_config(
        &config,
        QualityGate::default(),
        Arc::new(StaticFeed(vec![])),
        CannedProvider::replying(LONG_POST),
        channel.clone(),
    );

    let topic = sched.select_topic().await.unwrap();
    assert_eq!(topic.source, TopicSource::Curated);
    assert_eq!(topic.text, config.scheduler.curated_topics[0]);
}

// ============================================================================
// Quality gate
// ============================================================================

#[test]
fn test_quality_gate_word_threshold() {
    let gate = QualityGate::default();
    let nineteen = vec!["слово"; 19].join(" ");
    let twenty = vec!["слово"; 20].join(" ");

    assert_eq!(gate.evaluate(&nineteen), Verdict::TooShort { words: 19 });
    assert!(gate.accept(&twenty));
}

#[test]
fn test_quality_gate_rejects_apology_in_any_case() {
    let gate = QualityGate::default();
    let text = format!("Извините, {}", vec!["текст"; 25].join(" "));
    assert!(matches!(gate.evaluate(&text), Verdict::Blocked { .. }));
    assert!(gate.accept(LONG_POST));
}
