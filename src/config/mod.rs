//! Configuration management for AIlex
//!
//! Configuration is loaded from `~/.ailex/config.json` (or an explicit path)
//! and then overridden from the environment. Besides the `AILEX_SECTION_KEY`
//! variables, the bare `BOT_TOKEN` and `OPENROUTER_API_KEY` names of older
//! deployments are still honoured.

mod types;
pub mod validate;

pub use types::*;
pub use validate::{Diagnostic, DiagnosticLevel};

use crate::error::{AilexError, Result};
use std::path::{Path, PathBuf};

const SECRET_MASK: &str = "********";

impl Config {
    /// Returns the AIlex configuration directory path (~/.ailex)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ailex")
    }

    /// Returns the path to the config file (~/.ailex/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file without looking at the environment.
    ///
    /// A missing file yields the default configuration.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            AilexError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric or boolean values are ignored and the file value
    /// is kept.
    pub fn apply_overrides_from<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Provider
        if let Some(val) = get("OPENROUTER_API_KEY") {
            self.provider.api_key = val;
        }
        if let Some(val) = get("AILEX_PROVIDER_API_KEY") {
            self.provider.api_key = val;
        }
        if let Some(val) = get("AILEX_PROVIDER_API_BASE") {
            self.provider.api_base = val;
        }
        if let Some(val) = get("AILEX_PROVIDER_MODEL") {
            self.provider.model = val;
        }
        if let Some(val) = get("AILEX_PROVIDER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.provider.timeout_secs = v;
            }
        }

        // Persona
        if let Some(val) = get("AILEX_PERSONA_SYSTEM_PROMPT") {
            self.persona.system_prompt = val;
        }
        if let Some(val) = get("AILEX_PERSONA_POST_PROMPT") {
            self.persona.post_prompt = val;
        }

        // Telegram. A token from the environment turns the channel on.
        if let Some(val) = get("BOT_TOKEN") {
            self.telegram.token = val;
            self.telegram.enabled = true;
        }
        if let Some(val) = get("AILEX_TELEGRAM_TOKEN") {
            self.telegram.token = val;
            self.telegram.enabled = true;
        }
        if let Some(val) = get("AILEX_TELEGRAM_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.telegram.enabled = enabled;
            }
        }
        if let Some(val) = get("AILEX_TELEGRAM_ALLOW_FROM") {
            self.telegram.allow_from = split_list(&val);
        }

        // Sessions
        if let Some(val) = get("AILEX_SESSIONS_HISTORY_CAPACITY") {
            if let Ok(v) = val.parse() {
                self.sessions.history_capacity = v;
            }
        }
        if let Some(val) = get("AILEX_SESSIONS_IDLE_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                self.sessions.idle_timeout_secs = v;
            }
        }

        // Scheduler
        if let Some(val) = get("AILEX_SCHEDULER_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.scheduler.enabled = enabled;
            }
        }
        if let Some(val) = get("AILEX_SCHEDULER_INTERVAL_SECS") {
            if let Ok(v) = val.parse() {
                self.scheduler.interval_secs = v;
            }
        }
        if let Some(val) = get("AILEX_SCHEDULER_DESTINATION_CHAT_ID") {
            self.scheduler.destination_chat_id = val;
        }

        // Feed
        if let Some(val) = get("AILEX_FEED_URL") {
            self.feed.url = val;
        }

        // Delegation
        if let Some(val) = get("AILEX_DELEGATION_BASE_URL") {
            self.delegation.base_url = val;
            self.delegation.enabled = true;
        }
        if let Some(val) = get("AILEX_DELEGATION_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.delegation.enabled = enabled;
            }
        }

        // Heartbeat
        if let Some(val) = get("AILEX_HEARTBEAT_URL") {
            self.heartbeat.url = val;
            self.heartbeat.enabled = true;
        }
        if let Some(val) = get("AILEX_HEARTBEAT_INTERVAL_SECS") {
            if let Ok(v) = val.parse() {
                self.heartbeat.interval_secs = v;
            }
        }

        // Health
        if let Some(val) = get("AILEX_HEALTH_PORT").or_else(|| get("PORT")) {
            if let Ok(v) = val.parse() {
                self.health.port = v;
            }
        }

        // Logging
        if let Some(val) = get("AILEX_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = get("AILEX_LOG_FORMAT") {
            match val.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" => self.logging.format = LogFormat::Pretty,
                "component" => self.logging.format = LogFormat::Component,
                _ => {}
            }
        }
    }

    /// Returns a copy with secrets replaced, suitable for printing.
    pub fn masked(&self) -> Config {
        let mut copy = self.clone();
        copy.provider.api_key = mask(&copy.provider.api_key);
        copy.telegram.token = mask(&copy.telegram.token);
        copy
    }

    /// Checks the loaded configuration for problems that would stop or
    /// cripple the bot.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validate::validate(self)
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        SECRET_MASK.to_string()
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
