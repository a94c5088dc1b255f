//! Providers module - text generation client
//!
//! This module defines the `LLMProvider` trait and the OpenAI-compatible
//! client used to reach OpenRouter's chat completions endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use ailex::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use ailex::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::system("You are AIlex."), Message::user("Hello!")];
//!
//!     let response = provider.chat(messages, None, ChatOptions::new()).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
mod types;

use crate::error::ProviderError;

pub use openai::OpenAIProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, Usage};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
