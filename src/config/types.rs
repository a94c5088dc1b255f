//! Configuration type definitions for AIlex
//!
//! Every section implements serde traits with `#[serde(default)]`, so a
//! config file only needs the keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::delegation::protocol::ToolProtocol;
use crate::delegation::DEFAULT_TRIGGERS;
use crate::feed::DEFAULT_FEED_URL;
use crate::providers::openai::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, OPENROUTER_API_URL};
use crate::quality::{DEFAULT_BLOCKLIST, DEFAULT_MIN_WORDS};
use crate::session::evictor::DEFAULT_SWEEP_INTERVAL_SECS;
use crate::session::{DEFAULT_HISTORY_CAPACITY, DEFAULT_IDLE_TIMEOUT_SECS};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Main configuration struct for AIlex
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prompts and fixed replies
    pub persona: PersonaConfig,
    /// Text generation endpoint
    pub provider: ProviderConfig,
    /// Telegram channel
    pub telegram: TelegramConfig,
    /// Session memory and eviction
    pub sessions: SessionsConfig,
    /// Auto-posting
    pub scheduler: SchedulerConfig,
    /// RSS source for auto-posting
    pub feed: FeedConfig,
    /// Post quality gate
    pub quality: QualityConfig,
    /// Tool-building service hand-off
    pub delegation: DelegationConfig,
    /// Self-ping keepalive
    pub heartbeat: HeartbeatConfig,
    /// Liveness server
    pub health: HealthConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Persona
// ============================================================================

/// System prompts and canned replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// System framing for chat replies.
    pub system_prompt: String,
    /// System framing for scheduled posts.
    pub post_prompt: String,
    /// Sent when a chat reply cannot be generated.
    pub apology: String,
    /// Reply to `/start` in direct chats.
    pub greeting: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: "Ты — AIlex, эксперт по AI-автоматизации и заработку. \
                            Отвечаешь кратко, по делу, с идеями."
                .to_string(),
            post_prompt: "Ты — AIlex, нейрочеловек, Telegram-эксперт по ИИ и автоматизации. \
                          Пиши пост как для Telegram-канала: ярко, живо, с юмором, кратко и по делу. \
                          Используй HTML-разметку: <b>жирный</b> текст, <i>курсив</i>, эмодзи, списки. \
                          Не используй Markdown. Не объясняй, что ты ИИ. Просто сделай крутой пост!"
                .to_string(),
            apology: "⚠️ Ошибка генерации".to_string(),
            greeting: "Привет! 👋 Я — AIlex, твой помощник по ИИ и автоматизации. Чем могу помочь?"
                .to_string(),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

/// OpenAI-compatible completion endpoint (OpenRouter by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    /// Bound on one completion request, connect included.
    pub timeout_secs: u64,
    /// Sent as `HTTP-Referer` for OpenRouter attribution.
    pub referer: Option<String>,
    /// Sent as `X-Title` for OpenRouter attribution.
    pub title: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: OPENROUTER_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            referer: Some("https://t.me/YOUR_CHANNEL_NAME".to_string()),
            title: Some("AIlexBot".to_string()),
            max_tokens: None,
            temperature: None,
        }
    }
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    /// Whether the channel is enabled
    #[serde(default)]
    pub enabled: bool,
    /// Bot token from BotFather
    #[serde(default)]
    pub token: String,
    /// Allowlist of user IDs (empty = allow all)
    #[serde(default)]
    pub allow_from: Vec<String>,
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Turns kept per user; the oldest is dropped first.
    pub history_capacity: usize,
    /// A session idle for strictly longer than this is evicted.
    pub idle_timeout_secs: u64,
    /// How often the evictor sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Periodic posting to the broadcast destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Pause between the end of one cycle and the start of the next.
    pub interval_secs: u64,
    /// Chat id of the channel or group that receives posts.
    pub destination_chat_id: String,
    /// Topics used on curated turns, in rotation order.
    pub curated_topics: Vec<String>,
    /// Caption of the call-to-action button under each post.
    pub cta_label: String,
    /// Target of the call-to-action button.
    pub cta_url: String,
    /// Consecutive failed cycles before the scheduler reports degraded.
    pub failure_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1800,
            destination_chat_id: "-1002572659328".to_string(),
            curated_topics: strings(&[
                "Как ИИ меняет фриланс",
                "Заработок с помощью нейросетей",
                "Лучшие AI-инструменты апреля",
                "Как автоматизировать рутину с GPT",
                "ИИ-контент: быстро, дёшево, качественно",
            ]),
            cta_label: "🤖 Обсудить с AIlex".to_string(),
            cta_url: "https://t.me/ShilizyakaBot?start=from_post".to_string(),
            failure_threshold: 3,
        }
    }
}

// ============================================================================
// Feed
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

// ============================================================================
// Quality
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Posts with fewer whitespace-separated words are rejected.
    pub min_words: usize,
    /// Case-insensitive substrings that reject a post.
    pub blocklist: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_words: DEFAULT_MIN_WORDS,
            blocklist: strings(DEFAULT_BLOCKLIST),
        }
    }
}

// ============================================================================
// Delegation
// ============================================================================

/// External tool-building service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    pub enabled: bool,
    pub base_url: String,
    pub start_path: String,
    pub continue_path: String,
    pub timeout_secs: u64,
    /// Keywords that open a delegation (case-insensitive substring match).
    pub triggers: Vec<String>,
    /// Status tags the service answers with.
    pub protocol: ToolProtocol,
    pub failure_message: String,
    pub found_header: String,
    pub nothing_found_message: String,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            start_path: "/start".to_string(),
            continue_path: "/continue".to_string(),
            timeout_secs: 30,
            triggers: strings(DEFAULT_TRIGGERS),
            protocol: ToolProtocol::default(),
            failure_message: "⚠️ Сервис инструментов сейчас недоступен. Попробуй позже."
                .to_string(),
            found_header: "🔎 Нашёл подходящие инструменты:".to_string(),
            nothing_found_message: "🔎 Подходящих инструментов не нашлось.".to_string(),
        }
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Self-ping that keeps a sleeping host awake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Enable or disable the self-ping.
    pub enabled: bool,
    /// Public URL to GET; empty disables the ping.
    pub url: String,
    /// Ping interval in seconds.
    pub interval_secs: u64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            interval_secs: 600,
            timeout_secs: 10,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Compact single-line output with the `component` field.
    #[default]
    Component,
    /// Machine-readable JSON lines.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
