//! # tether-runtime
//!
//! Retry, backoff and model fallback around LLM completion endpoints.
//!
//! A [`ResilientCaller`] wraps any [`CompletionClient`]:
//! - rate limits and timeouts are retried with exponential backoff
//! - a rejected model is replaced once by the fallback model
//! - any other failure is returned immediately
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_core::CallRequest;
//! use tether_runtime::{OpenAiProvider, ResilientCaller};
//!
//! let client = Arc::new(OpenAiProvider::from_env()?);
//! let caller = ResilientCaller::new(client, "gpt-4o", 5)?;
//!
//! let request = CallRequest::builder("gpt-5")
//!     .user("Explain exponential backoff.")
//!     .option("reasoning_effort", "minimal")
//!     .build()?;
//!
//! let outcome = caller.call(&request).await?;
//! println!("{} (fallback: {})", outcome.content(), outcome.fallback_used);
//! ```

pub mod config;
pub mod providers;
pub mod resilience;

pub use config::{ConfigError, RuntimeConfig};
pub use providers::{CompletionClient, ProviderError, ProviderFactory, ProviderRegistry};
pub use resilience::{
    CallError, FallbackPolicy, LlmUsage, PolicyError, ResilientCaller, ResilientCallerBuilder,
    RetryPolicy, RetryState, UsageTracker,
};

#[cfg(feature = "openai")]
pub use providers::{OpenAiProvider, OpenAiProviderFactory};
