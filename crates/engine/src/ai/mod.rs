//! AI-assisted personalization extraction.
//!
//! Items no deterministic source could resolve are sent to a chat completion
//! model in one prompt per order. The reply must be a JSON object matching
//! [`schema::AiOrderResponse`]; anything else fails the whole order.

pub mod client;
pub mod extractor;
pub mod prompt;
pub mod repair;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;

pub use client::OpenAiClient;
pub use extractor::{AiExtraction, AiExtractor, QUEUE_SCRIPT_NAME, reconcile_quantities};
pub use prompt::{AiItemInput, AiPromptInput, PromptSet, Regeneration, RenderedPrompt, item_key};
pub use schema::{AiOrderResponse, ItemPersonalizationResult, PersonalizationDetail, parse_response};

/// Errors from the completion provider or from its reply.
#[derive(Debug, Error)]
pub enum AiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an error status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the provider.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The API key was rejected.
    #[error("unauthorized: invalid API key")]
    Unauthorized,

    /// The client could not be configured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The reply had no message content.
    #[error("empty response content")]
    EmptyResponse,

    /// The reply was not parseable JSON, even after repair.
    #[error("failed to parse AI JSON: {0}")]
    InvalidJson(String),

    /// The reply parsed but does not match the response schema.
    #[error("AI response validation failed: {0}")]
    Validation(String),

    /// The prompt input could not be serialized.
    #[error("could not build prompt: {0}")]
    Prompt(#[from] serde_json::Error),
}

/// A chat completion model that answers in JSON.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model name recorded in the audit log.
    fn model(&self) -> &str;

    /// Send one system + user exchange and return the raw message content.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}
