//! LLM provider abstractions for tether-runtime.
//!
//! This module defines the trait every completion endpoint implements and
//! the error taxonomy the resilience layer classifies.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for secure credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

use tether_core::{CallOptions, ChatMessage, CompletionResponse, FailureKind};

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiCredentials, OpenAiProvider, OpenAiProviderFactory};

lazy_static! {
    /// Provider messages that mean "this model id is not available to you".
    static ref MODEL_UNAVAILABLE: Regex = Regex::new(
        r"(?i)(model\s+\S+\s+does\s+not\s+exist|do(es)?\s+not\s+have\s+access\s+to\s+(the\s+)?model|model_not_found|unknown\s+model)"
    ).unwrap();
}

/// Errors from LLM providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Model not available: {model}")]
    ModelNotFound { model: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// How the resilience layer should treat this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProviderError::RateLimited { .. } => FailureKind::RateLimited,
            ProviderError::Timeout(_) => FailureKind::TimedOut,
            ProviderError::ModelNotFound { .. } => FailureKind::ModelNotFound,
            _ => FailureKind::Other,
        }
    }

    /// Classify a non-success API response that is not a rate limit or timeout.
    ///
    /// `code` is the machine-readable error code from the body when the
    /// provider sends one.
    pub fn from_api_response(
        model: &str,
        status: u16,
        code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();

        if code == Some("model_not_found") || status == 404 || MODEL_UNAVAILABLE.is_match(&message)
        {
            return ProviderError::ModelNotFound {
                model: model.to_string(),
            };
        }

        match status {
            401 | 403 => ProviderError::AuthError,
            _ => ProviderError::ApiError { status, message },
        }
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// The resilience layer only looks at [`ProviderError::kind`]; the response
/// is passed back to the caller untouched. Implementations are shared
/// between concurrent calls and must not keep per-call state.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}
