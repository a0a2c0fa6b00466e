//! Provider responses and call outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,

    /// Prompt tokens served from the provider's cache
    #[serde(default)]
    pub cached_tokens: u32,

    /// Completion tokens spent on hidden reasoning
    #[serde(default)]
    pub reasoning_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Response from an LLM completion.
///
/// The resilience layer never looks inside this value; it is handed back to
/// the caller exactly as the provider produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model reported by the provider
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,

    /// Raw response body
    #[serde(default)]
    pub raw: JsonValue,
}

impl CompletionResponse {
    /// Create a response with no usage data and an empty raw body.
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
            model: model.into(),
            stop_reason: None,
            raw: JsonValue::Null,
        }
    }
}

/// Result of one top-level resilient call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    /// Whether the call succeeded
    pub success: bool,

    /// Provider response
    pub response: CompletionResponse,

    /// Whether the fallback model answered instead of the requested one
    pub fallback_used: bool,

    /// Model the successful request was sent to
    pub model_used: String,

    /// Outbound requests made, including the successful one
    pub attempts: u32,

    /// When the call finished
    pub completed_at: DateTime<Utc>,
}

impl CallOutcome {
    /// Outcome of a call answered by the requested model.
    pub fn primary(response: CompletionResponse, model: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: true,
            response,
            fallback_used: false,
            model_used: model.into(),
            attempts,
            completed_at: Utc::now(),
        }
    }

    /// Outcome of a call answered by the fallback model.
    pub fn fallback(response: CompletionResponse, model: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: true,
            response,
            fallback_used: true,
            model_used: model.into(),
            attempts,
            completed_at: Utc::now(),
        }
    }

    /// Generated text.
    pub fn content(&self) -> &str {
        &self.response.content
    }
}
