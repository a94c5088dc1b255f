//! Quality gate for scheduled posts.
//!
//! A pure acceptance filter: generated text is rejected when it is too short
//! or when it contains a refusal/apology phrase. Matching is case-insensitive
//! for Cyrillic as well as Latin text, so both the phrases and the text are
//! lowercased before an Aho-Corasick scan.

use aho_corasick::AhoCorasick;

use crate::config::QualityConfig;
use crate::error::{AilexError, Result};

/// Minimum number of whitespace-separated words a post must have.
pub const DEFAULT_MIN_WORDS: usize = 20;

/// Refusal and apology markers that disqualify a post.
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "извин",
    "не могу",
    "к сожалению",
    "как языковая модель",
    "как ии",
    "sorry",
    "i cannot",
    "i can't",
    "as an ai",
    "i apologize",
];

/// Why a text was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    TooShort { words: usize },
    Blocked { phrase: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accepted => write!(f, "accepted"),
            Verdict::TooShort { words } => write!(f, "too short ({} words)", words),
            Verdict::Blocked { phrase } => write!(f, "contains blocked phrase {:?}", phrase),
        }
    }
}

/// Pre-publication acceptance filter.
#[derive(Debug, Clone)]
pub struct QualityGate {
    min_words: usize,
    phrases: Vec<String>,
    /// `None` when the blocklist is empty.
    matcher: Option<AhoCorasick>,
}

impl QualityGate {
    /// Build a gate from a minimum word count and a blocklist.
    ///
    /// Empty phrases are ignored.
    ///
    /// # Example
    /// ```
    /// use ailex::quality::QualityGate;
    ///
    /// let gate = QualityGate::new(3, &["sorry"]).unwrap();
    /// assert!(gate.accept("one two three"));
    /// assert!(!gate.accept("Sorry, one two three"));
    /// ```
    pub fn new<S: AsRef<str>>(min_words: usize, blocklist: &[S]) -> Result<Self> {
        let phrases: Vec<String> = blocklist
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let matcher = if phrases.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&phrases)
                    .map_err(|e| AilexError::Config(format!("Invalid quality blocklist: {}", e)))?,
            )
        };

        Ok(Self {
            min_words,
            phrases,
            matcher,
        })
    }

    /// A gate that only enforces the word count.
    pub fn words_only(min_words: usize) -> Self {
        Self {
            min_words,
            phrases: Vec::new(),
            matcher: None,
        }
    }

    /// Build a gate from the `quality` config section.
    pub fn from_config(config: &QualityConfig) -> Result<Self> {
        Self::new(config.min_words, &config.blocklist)
    }

    /// Classify `text`.
    pub fn evaluate(&self, text: &str) -> Verdict {
        let words = text.split_whitespace().count();
        if words < self.min_words {
            return Verdict::TooShort { words };
        }

        let lowered = text.to_lowercase();
        if let Some(m) = self.matcher.as_ref().and_then(|m| m.find(&lowered)) {
            return Verdict::Blocked {
                phrase: self.phrases[m.pattern().as_usize()].clone(),
            };
        }

        Verdict::Accepted
    }

    /// Whether `text` may be published.
    pub fn accept(&self, text: &str) -> bool {
        self.evaluate(text).is_accepted()
    }

    pub fn min_words(&self) -> usize {
        self.min_words
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WORDS, DEFAULT_BLOCKLIST)
            .unwrap_or_else(|_| Self::words_only(DEFAULT_MIN_WORDS))
    }
}
