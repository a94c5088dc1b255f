//! OpenAI-compatible Provider Implementation
//!
//! This module implements the `LLMProvider` trait for the Chat Completions
//! API as served by OpenRouter (and any other OpenAI-compatible endpoint).
//!
//! # Example
//!
//! ```rust,ignore
//! use ailex::providers::{openai::OpenAIProvider, ChatOptions, LLMProvider};
//! use ailex::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key")
//!         .with_attribution("https://t.me/my_channel", "AIlexBot");
//!
//!     let messages = vec![
//!         Message::system("You are AIlex."),
//!         Message::user("Hello!"),
//!     ];
//!
//!     let response = provider
//!         .chat(messages, None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!
//!     println!("AIlex: {}", response.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{AilexError, ProviderError, Result};
use crate::session::Message;

use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, Usage};

/// The OpenRouter API endpoint URL.
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// API Request Types
// ============================================================================

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    /// Model identifier
    model: String,
    /// Conversation messages (including system)
    messages: Vec<OpenAIMessage>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in the API's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

/// OpenAI-compatible text generation client.
pub struct OpenAIProvider {
    /// API key for authentication
    api_key: String,
    /// API base URL
    api_base: String,
    /// Model used when the caller does not override it
    model: String,
    /// `HTTP-Referer` attribution header
    referer: Option<String>,
    /// `X-Title` attribution header
    title: Option<String>,
    /// HTTP client for making requests
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider against OpenRouter with the default model.
    ///
    /// # Example
    /// ```
    /// use ailex::providers::openai::OpenAIProvider;
    /// use ailex::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-or-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// assert_eq!(provider.default_model(), "meta-llama/llama-4-maverick");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_client(api_key, OPENROUTER_API_URL, Self::build_client(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider against a custom OpenAI-compatible base URL.
    ///
    /// A trailing slash on `api_base` is removed.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self::with_client(api_key, api_base, Self::build_client(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            referer: None,
            title: None,
            client,
        }
    }

    /// Build a provider from the `provider` config section.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AilexError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let mut provider = Self::with_client(&config.api_key, &config.api_base, client)
            .with_model(&config.model);
        provider.referer = config.referer.clone().filter(|s| !s.is_empty());
        provider.title = config.title.clone().filter(|s| !s.is_empty());
        Ok(provider)
    }

    /// Set the default model (builder pattern).
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Set the OpenRouter attribution headers (builder pattern).
    pub fn with_attribution(mut self, referer: &str, title: &str) -> Self {
        self.referer = Some(referer.to_string());
        self.title = Some(title.to_string());
        self
    }

    fn build_client(timeout_secs: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new())
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| OpenAIMessage {
            role: msg.role.to_string(),
            content: msg.content,
        })
        .collect()
}

/// Parse a success body into a response.
///
/// A body that cannot be decoded, has no choices, or whose first choice has
/// no non-blank content is reported as [`ProviderError::Malformed`].
fn parse_completion(body: &str) -> Result<LLMResponse> {
    let response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("undecodable body: {}", e)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ProviderError::Malformed("first choice has no content".to_string()))?;

    let mut llm_response = LLMResponse::text(&content);
    if let Some(usage) = response.usage {
        llm_response =
            llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    Ok(llm_response)
}

/// Extract the human-readable message of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(&self.model);
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!(
            "Chat completion request to model {} ({} messages)",
            model,
            request.messages.len()
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if let Some(ref referer) = self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        if !status.is_success() {
            return Err(parse_provider_error(status.as_u16(), &error_message(&body)).into());
        }

        let llm_response = parse_completion(&body)?;
        info!(
            chars = llm_response.content.chars().count(),
            "Chat completion received"
        );
        Ok(llm_response)
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================
