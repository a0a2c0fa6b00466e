//! Token and cost accounting across resilient calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tether_core::{CallOutcome, TokenUsage};

/// Accumulated usage across calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Prompt tokens served from the provider's cache
    pub cached_tokens: u32,

    /// Completion tokens spent on hidden reasoning
    pub reasoning_tokens: u32,

    /// Successful calls recorded
    pub calls: u32,

    /// Outbound attempts, including retries and fallbacks
    pub attempts: u32,

    /// Calls answered by the fallback model
    pub fallbacks: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add one completed call.
    pub fn add(&mut self, outcome: &CallOutcome) {
        let usage = &outcome.response.usage;

        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total());
        self.cached_tokens = self.cached_tokens.saturating_add(usage.cached_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(usage.reasoning_tokens);
        self.calls = self.calls.saturating_add(1);
        self.attempts = self.attempts.saturating_add(outcome.attempts);
        if outcome.fallback_used {
            self.fallbacks = self.fallbacks.saturating_add(1);
        }

        self.estimated_cost += estimate_cost(usage, &outcome.model_used);
    }
}

/// Estimate the USD cost of one response.
pub fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    // Per million tokens: (input, cached input, output)
    let (input_rate, cached_rate, output_rate) = match model {
        m if m.contains("gpt-5-nano") => (0.05, 0.005, 0.4),
        m if m.contains("gpt-5-mini") => (0.25, 0.025, 2.0),
        m if m.contains("gpt-5") => (1.25, 0.125, 10.0),
        m if m.contains("gpt-4o-mini") => (0.15, 0.075, 0.6),
        m if m.contains("gpt-4o") => (2.5, 1.25, 10.0),
        _ => (2.5, 1.25, 10.0),
    };

    let cached = usage.cached_tokens.min(usage.prompt_tokens);
    let uncached = usage.prompt_tokens - cached;

    let input_cost = (uncached as f64 / 1_000_000.0) * input_rate;
    let cached_cost = (cached as f64 / 1_000_000.0) * cached_rate;
    let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;

    input_cost + cached_cost + output_cost
}

/// Shared usage tracker.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed call.
    pub fn record(&self, outcome: &CallOutcome) {
        self.usage.write().add(outcome);
    }

    /// Snapshot of the usage so far.
    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn reset(&self) {
        *self.usage.write() = LlmUsage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_core::CompletionResponse;

    fn outcome(model: &str, prompt: u32, completion: u32, fallback: bool) -> CallOutcome {
        let mut response = CompletionResponse::text(model, "ok");
        response.usage = TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            cached_tokens: 0,
            reasoning_tokens: 0,
        };

        if fallback {
            CallOutcome::fallback(response, model, 2)
        } else {
            CallOutcome::primary(response, model, 1)
        }
    }

    #[test]
    fn test_tracker_accumulates() {
        let tracker = UsageTracker::new();

        tracker.record(&outcome("gpt-5", 100, 50, false));
        tracker.record(&outcome("gpt-4o", 30, 20, true));

        let usage = tracker.usage();
        assert_eq!(usage.calls, 2);
        assert_eq!(usage.attempts, 3);
        assert_eq!(usage.fallbacks, 1);
        assert_eq!(usage.prompt_tokens, 130);
        assert_eq!(usage.completion_tokens, 70);
        assert_eq!(usage.total_tokens, 200);
        assert!(usage.estimated_cost > 0.0);

        tracker.reset();
        assert_eq!(tracker.usage(), LlmUsage::default());
    }

    #[test]
    fn test_counts_saturate_instead_of_overflowing() {
        let mut usage = LlmUsage::default();
        let huge = outcome("gpt-5", u32::MAX, u32::MAX, false);

        usage.add(&huge);
        usage.add(&huge);

        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
        assert_eq!(usage.calls, 2);
    }

    #[test]
    fn test_cost_estimation() {
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 100_000,
            cached_tokens: 0,
            reasoning_tokens: 0,
        };

        // 1M input at $2.50 + 100k output at $10/MTok
        let cost = estimate_cost(&usage, "gpt-4o-2024-08-06");
        assert!((cost - 3.5).abs() < 1e-9);

        // Mini pricing is matched before the broader family
        let mini = estimate_cost(&usage, "gpt-4o-mini");
        assert!((mini - 0.21).abs() < 1e-9);
    }

    #[test]
    fn test_cached_tokens_are_cheaper() {
        let plain = TokenUsage {
            prompt_tokens: 10_000,
            completion_tokens: 0,
            cached_tokens: 0,
            reasoning_tokens: 0,
        };
        let cached = TokenUsage {
            cached_tokens: 8_000,
            ..plain
        };

        assert!(estimate_cost(&cached, "gpt-5") < estimate_cost(&plain, "gpt-5"));
    }

    #[test]
    fn test_tracker_is_shared_across_threads() {
        let tracker = Arc::new(UsageTracker::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.record(&outcome("gpt-5", 10, 10, false)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.usage().calls, 4);
    }
}
