//! Configuration validation.
//!
//! Two passes: [`validate_config`] looks at the raw JSON for unknown keys,
//! [`validate`] looks at the loaded [`Config`] for values that would stop
//! the bot or leave a feature silently inert.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "persona",
    "provider",
    "telegram",
    "sessions",
    "scheduler",
    "feed",
    "quality",
    "delegation",
    "heartbeat",
    "health",
    "logging",
];

const KNOWN_PROVIDER: &[&str] = &[
    "api_key",
    "api_base",
    "model",
    "timeout_secs",
    "referer",
    "title",
    "max_tokens",
    "temperature",
];

const KNOWN_SCHEDULER: &[&str] = &[
    "enabled",
    "interval_secs",
    "destination_chat_id",
    "curated_topics",
    "cta_label",
    "cta_url",
    "failure_threshold",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        found = true;
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}'; {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, &path, msg));
    }
    found
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = unknown_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    if let Some(provider) = obj.get("provider").and_then(|v| v.as_object()) {
        has_unknown |= unknown_keys(provider, KNOWN_PROVIDER, "provider", &mut diagnostics);
    }
    if let Some(scheduler) = obj.get("scheduler").and_then(|v| v.as_object()) {
        has_unknown |= unknown_keys(scheduler, KNOWN_SCHEDULER, "scheduler", &mut diagnostics);
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Validate a loaded configuration (file plus environment).
pub fn validate(config: &Config) -> Vec<Diagnostic> {
    use DiagnosticLevel::{Error, Ok, Warn};
    let mut diags = Vec::new();

    if config.provider.api_key.is_empty() {
        diags.push(Diagnostic::new(
            Error,
            "provider.api_key",
            "Missing; set OPENROUTER_API_KEY or provider.api_key",
        ));
    } else {
        diags.push(Diagnostic::new(Ok, "provider.api_key", "Set"));
    }
    if reqwest::Url::parse(&config.provider.api_base).is_err() {
        diags.push(Diagnostic::new(Error, "provider.api_base", "Not a valid URL"));
    }

    if config.telegram.enabled {
        if config.telegram.token.is_empty() {
            diags.push(Diagnostic::new(
                Error,
                "telegram.token",
                "Channel enabled without a token; set BOT_TOKEN",
            ));
        }
        if config.telegram.allow_from.is_empty() {
            diags.push(Diagnostic::new(
                Warn,
                "telegram.allow_from",
                "Empty; anyone can message the bot",
            ));
        }
    } else {
        diags.push(Diagnostic::new(
            Warn,
            "telegram.enabled",
            "Disabled; the bot will not receive or post messages",
        ));
    }

    if config.sessions.history_capacity == 0 {
        diags.push(Diagnostic::new(
            Warn,
            "sessions.history_capacity",
            "0 is raised to 1",
        ));
    }
    if config.sessions.sweep_interval_secs == 0 {
        diags.push(Diagnostic::new(
            Error,
            "sessions.sweep_interval_secs",
            "Must be greater than 0",
        ));
    }

    if config.scheduler.enabled {
        if config.scheduler.interval_secs == 0 {
            diags.push(Diagnostic::new(
                Error,
                "scheduler.interval_secs",
                "Must be greater than 0",
            ));
        }
        if config.scheduler.destination_chat_id.parse::<i64>().is_err() {
            diags.push(Diagnostic::new(
                Error,
                "scheduler.destination_chat_id",
                "Must be a numeric chat id",
            ));
        }
        if config.scheduler.curated_topics.is_empty() {
            diags.push(Diagnostic::new(
                Warn,
                "scheduler.curated_topics",
                "Empty; curated turns will be skipped",
            ));
        }
        if reqwest::Url::parse(&config.scheduler.cta_url).is_err() {
            diags.push(Diagnostic::new(
                Warn,
                "scheduler.cta_url",
                "Not a valid URL; posts go out without a button",
            ));
        }
    }

    if config.delegation.enabled && config.delegation.base_url.is_empty() {
        diags.push(Diagnostic::new(
            Error,
            "delegation.base_url",
            "Delegation enabled without a service URL",
        ));
    }

    if config.heartbeat.enabled && config.heartbeat.url.is_empty() {
        diags.push(Diagnostic::new(
            Warn,
            "heartbeat.url",
            "Heartbeat enabled without a URL; nothing will be pinged",
        ));
    }

    if !diags.iter().any(|d| d.level != Ok) {
        diags.push(Diagnostic::new(Ok, "", "Configuration looks good"));
    }
    diags
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ready_config() -> Config {
        let mut config = Config::default();
        config.provider.api_key = "sk-test".into();
        config.telegram.enabled = true;
        config.telegram.token = "123:abc".into();
        config.telegram.allow_from = vec!["42".into()];
        config
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("health", "health"), 0);
        assert_eq!(levenshtein("feed", "fed"), 1);
        assert_eq!(levenshtein("абв", "абг"), 1);
    }

    #[test]
    fn test_suggest_field_match() {
        let result = suggest_field("schedular", KNOWN_TOP_LEVEL);
        assert_eq!(result.as_deref(), Some("did you mean 'scheduler'?"));
    }

    #[test]
    fn test_suggest_field_no_match() {
        assert!(suggest_field("xyzabc", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_valid_raw_config() {
        let raw = json!({
            "provider": {"model": "gpt-4o"},
            "health": {"port": 8080}
        });
        let diags = validate_config(&raw);
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_unknown_nested_field() {
        let raw = json!({"scheduler": {"intervall_secs": 10}});
        let diags = validate_config(&raw);
        let err = diags.iter().find(|d| d.is_error()).unwrap();
        assert_eq!(err.path, "scheduler.intervall_secs");
        assert!(err.message.contains("interval_secs"));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags
            .iter()
            .any(|d| d.is_error() && d.message.contains("must be a JSON object")));
    }

    #[test]
    fn test_ready_config_has_no_errors() {
        let diags = validate(&ready_config());
        assert!(diags.iter().all(|d| !d.is_error()), "{:?}", diags);
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let mut config = ready_config();
        config.provider.api_key.clear();
        let diags = validate(&config);
        assert!(diags
            .iter()
            .any(|d| d.is_error() && d.path == "provider.api_key"));
    }

    #[test]
    fn test_enabled_telegram_without_token() {
        let mut config = ready_config();
        config.telegram.token.clear();
        assert!(validate(&config)
            .iter()
            .any(|d| d.is_error() && d.path == "telegram.token"));
    }

    #[test]
    fn test_empty_allowlist_warns() {
        let mut config = ready_config();
        config.telegram.allow_from.clear();
        assert!(validate(&config).iter().any(|d| {
            d.level == DiagnosticLevel::Warn && d.message.contains("anyone can message")
        }));
    }

    #[test]
    fn test_non_numeric_destination() {
        let mut config = ready_config();
        config.scheduler.destination_chat_id = "@channel".into();
        assert!(validate(&config)
            .iter()
            .any(|d| d.is_error() && d.path == "scheduler.destination_chat_id"));
    }

    #[test]
    fn test_delegation_without_url() {
        let mut config = ready_config();
        config.delegation.enabled = true;
        assert!(validate(&config)
            .iter()
            .any(|d| d.is_error() && d.path == "delegation.base_url"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticLevel::Warn, "heartbeat.url", "Missing");
        assert_eq!(d.to_string(), "[WARN] heartbeat.url: Missing");
        let d = Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON");
        assert_eq!(d.to_string(), "[OK] Valid JSON");
    }
}
