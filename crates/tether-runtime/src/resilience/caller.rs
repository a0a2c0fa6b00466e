//! Resilient completion calls.
//!
//! [`ResilientCaller::call`] runs one request to a terminal state:
//!
//! ```text
//! START -> ATTEMPT_PRIMARY
//! ATTEMPT_PRIMARY --success--> SUCCESS
//! ATTEMPT_PRIMARY --transient, attempts remaining--> WAIT -> ATTEMPT_PRIMARY
//! ATTEMPT_PRIMARY --transient, attempts exhausted--> FAILED_RETRY_EXHAUSTED
//! ATTEMPT_PRIMARY --model_not_found--> ATTEMPT_FALLBACK
//! ATTEMPT_FALLBACK --success--> SUCCESS_FALLBACK
//! ATTEMPT_FALLBACK --any failure--> FAILED_FALLBACK
//! ATTEMPT_PRIMARY --other failure--> FAILED_OTHER
//! ```
//!
//! The caller keeps no state between calls. Backoff waits are async sleeps,
//! so concurrent calls on the same runtime are never stalled by each other.
//! Dropping the returned future cancels the call.

use std::sync::Arc;
use thiserror::Error;

use tether_core::{
    CallEvent, CallOutcome, CallReporter, CallRequest, FailureKind, RequestError, TracingReporter,
};

use super::fallback::FallbackPolicy;
use super::retry::{PolicyError, RetryPolicy};
use crate::providers::{CompletionClient, ProviderError};

/// Terminal errors from a resilient call.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("Retries exhausted after {attempts} attempts against {model}: {source}")]
    RetryExhausted {
        model: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Fallback to {model} failed: {source}")]
    FallbackFailed {
        model: String,
        #[source]
        source: ProviderError,
    },

    #[error("Completion call to {model} failed: {source}")]
    CallFailed {
        model: String,
        #[source]
        source: ProviderError,
    },
}

impl CallError {
    /// The provider failure behind this error, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            CallError::InvalidRequest(_) => None,
            CallError::RetryExhausted { source, .. }
            | CallError::FallbackFailed { source, .. }
            | CallError::CallFailed { source, .. } => Some(source),
        }
    }
}

/// Wraps a [`CompletionClient`] with retry and model fallback.
pub struct ResilientCaller {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    fallback: FallbackPolicy,
    reporter: Arc<dyn CallReporter>,
}

impl ResilientCaller {
    /// Create a caller with a fallback model and an attempt limit.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        fallback_model: impl Into<String>,
        max_retries: u32,
    ) -> Result<Self, PolicyError> {
        Ok(Self::builder(client)
            .retry_policy(RetryPolicy::new(max_retries)?)
            .fallback_policy(FallbackPolicy::new(fallback_model)?)
            .build())
    }

    pub fn builder(client: Arc<dyn CompletionClient>) -> ResilientCallerBuilder {
        ResilientCallerBuilder::new(client)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn fallback_policy(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Run one request to completion.
    pub async fn call(&self, request: &CallRequest) -> Result<CallOutcome, CallError> {
        let model = request.model();
        let mut state = self.retry.start();

        loop {
            let attempt = state.record_attempt();
            self.reporter.report(&CallEvent::AttemptStarted {
                model: model.to_string(),
                attempt,
            });

            let err = match self
                .client
                .complete(model, request.messages(), request.options())
                .await
            {
                Ok(response) => {
                    self.reporter.report(&CallEvent::Completed {
                        model: model.to_string(),
                        attempts: state.attempts(),
                        fallback_used: false,
                    });
                    return Ok(CallOutcome::primary(response, model, state.attempts()));
                }
                Err(err) => err,
            };

            let kind = err.kind();
            self.reporter.report(&CallEvent::AttemptFailed {
                model: model.to_string(),
                attempt,
                kind,
                message: err.to_string(),
            });

            match kind {
                FailureKind::RateLimited | FailureKind::TimedOut => match state.next_delay() {
                    Some(delay) => {
                        self.reporter.report(&CallEvent::RetryScheduled {
                            model: model.to_string(),
                            next_attempt: state.attempts(),
                            delay,
                        });
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(CallError::RetryExhausted {
                            model: model.to_string(),
                            attempts: state.attempts(),
                            source: err,
                        });
                    }
                },
                FailureKind::ModelNotFound => {
                    return self.call_fallback(request, state.attempts()).await;
                }
                FailureKind::Other => {
                    return Err(CallError::CallFailed {
                        model: model.to_string(),
                        source: err,
                    });
                }
            }
        }
    }

    /// Exactly one attempt against the fallback model.
    async fn call_fallback(
        &self,
        request: &CallRequest,
        attempts_so_far: u32,
    ) -> Result<CallOutcome, CallError> {
        let fallback_request = self.fallback.fallback_request(request)?;
        let model = fallback_request.model();
        let attempts = attempts_so_far + 1;

        self.reporter.report(&CallEvent::FallbackTriggered {
            from_model: request.model().to_string(),
            to_model: model.to_string(),
        });
        self.reporter.report(&CallEvent::AttemptStarted {
            model: model.to_string(),
            attempt: attempts_so_far,
        });

        match self
            .client
            .complete(
                model,
                fallback_request.messages(),
                fallback_request.options(),
            )
            .await
        {
            Ok(response) => {
                self.reporter.report(&CallEvent::Completed {
                    model: model.to_string(),
                    attempts,
                    fallback_used: true,
                });
                Ok(CallOutcome::fallback(response, model, attempts))
            }
            Err(err) => {
                self.reporter.report(&CallEvent::AttemptFailed {
                    model: model.to_string(),
                    attempt: attempts_so_far,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                Err(CallError::FallbackFailed {
                    model: model.to_string(),
                    source: err,
                })
            }
        }
    }
}

impl std::fmt::Debug for ResilientCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCaller")
            .field("client", &self.client.name())
            .field("retry", &self.retry)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Builder for [`ResilientCaller`].
pub struct ResilientCallerBuilder {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    fallback: FallbackPolicy,
    reporter: Arc<dyn CallReporter>,
}

impl ResilientCallerBuilder {
    /// Start from default policies and the tracing reporter.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            fallback: FallbackPolicy::default(),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn fallback_policy(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn CallReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn build(self) -> ResilientCaller {
        ResilientCaller {
            client: self.client,
            retry: self.retry,
            fallback: self.fallback,
            reporter: self.reporter,
        }
    }
}
