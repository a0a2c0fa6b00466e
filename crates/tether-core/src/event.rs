//! Call lifecycle events and the reporter that receives them.
//!
//! The resilience layer does no printing or logging of its own. Every
//! interesting step is turned into a [`CallEvent`] and handed to an injected
//! [`CallReporter`]; [`TracingReporter`] forwards them to `tracing`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a failed attempt is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider throttled the caller. Retried.
    RateLimited,

    /// The request did not complete in time. Retried.
    TimedOut,

    /// The requested model is not available to the caller. Triggers fallback.
    ModelNotFound,

    /// Anything else. Surfaced immediately.
    Other,
}

impl FailureKind {
    /// Whether a failure of this kind is expected to clear up after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::TimedOut)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::TimedOut => "timed_out",
            FailureKind::ModelNotFound => "model_not_found",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Something that happened during a resilient call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CallEvent {
    /// An outbound request is about to be sent.
    AttemptStarted { model: String, attempt: u32 },

    /// An outbound request failed.
    AttemptFailed {
        model: String,
        attempt: u32,
        kind: FailureKind,
        message: String,
    },

    /// A transient failure will be retried after `delay`.
    RetryScheduled {
        model: String,
        next_attempt: u32,
        delay: Duration,
    },

    /// The requested model was unavailable; switching to the fallback.
    FallbackTriggered { from_model: String, to_model: String },

    /// The call succeeded.
    Completed {
        model: String,
        attempts: u32,
        fallback_used: bool,
    },
}

/// Receives call lifecycle events.
pub trait CallReporter: Send + Sync {
    fn report(&self, event: &CallEvent);
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl CallReporter for NullReporter {
    fn report(&self, _event: &CallEvent) {}
}

/// Reporter that emits events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl CallReporter for TracingReporter {
    fn report(&self, event: &CallEvent) {
        match event {
            CallEvent::AttemptStarted { model, attempt } => {
                tracing::debug!(model = %model, attempt, "Sending completion request");
            }
            CallEvent::AttemptFailed {
                model,
                attempt,
                kind,
                message,
            } => {
                tracing::warn!(
                    model = %model,
                    attempt,
                    kind = %kind,
                    error = %message,
                    "Completion attempt failed"
                );
            }
            CallEvent::RetryScheduled {
                model,
                next_attempt,
                delay,
            } => {
                tracing::info!(model = %model, next_attempt, delay = ?delay, "Retrying after backoff");
            }
            CallEvent::FallbackTriggered {
                from_model,
                to_model,
            } => {
                tracing::warn!(
                    from = %from_model,
                    to = %to_model,
                    "Model unavailable, falling back"
                );
            }
            CallEvent::Completed {
                model,
                attempts,
                fallback_used,
            } => {
                tracing::debug!(model = %model, attempts, fallback_used, "Completion succeeded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(FailureKind::RateLimited.is_transient());
        assert!(FailureKind::TimedOut.is_transient());
        assert!(!FailureKind::ModelNotFound.is_transient());
        assert!(!FailureKind::Other.is_transient());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CallEvent::FallbackTriggered {
            from_model: "gpt-5".to_string(),
            to_model: "gpt-4o".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fallback_triggered");
        assert_eq!(json["to_model"], "gpt-4o");
    }

    #[test]
    fn test_reporters_accept_all_events() {
        let events = [
            CallEvent::AttemptStarted {
                model: "m".to_string(),
                attempt: 0,
            },
            CallEvent::AttemptFailed {
                model: "m".to_string(),
                attempt: 0,
                kind: FailureKind::TimedOut,
                message: "timeout".to_string(),
            },
            CallEvent::RetryScheduled {
                model: "m".to_string(),
                next_attempt: 1,
                delay: Duration::from_secs(1),
            },
            CallEvent::Completed {
                model: "m".to_string(),
                attempts: 2,
                fallback_used: false,
            },
        ];

        for event in &events {
            NullReporter.report(event);
            TracingReporter.report(event);
        }
    }
}
