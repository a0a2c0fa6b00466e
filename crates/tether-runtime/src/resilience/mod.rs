//! Resilience patterns for completion calls.
//!
//! This module provides:
//! - Bounded retry with exponential backoff
//! - Single-shot fallback to another model
//! - The resilient caller that combines them
//! - Token and cost accounting

mod caller;
mod fallback;
mod retry;
mod usage;

pub use caller::{CallError, ResilientCaller, ResilientCallerBuilder};
pub use fallback::{FallbackPolicy, DEFAULT_FALLBACK_MODEL, DEFAULT_PRIMARY_ONLY_OPTIONS};
pub use retry::{
    PolicyError, RetryPolicy, RetryState, DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_DELAY,
    DEFAULT_MAX_RETRIES,
};
pub use usage::{estimate_cost, LlmUsage, UsageTracker};
