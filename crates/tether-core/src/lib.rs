//! # tether-core
//!
//! Request, outcome and event types for resilient LLM completion calls.
//!
//! This crate holds the data model shared by the runtime and the CLI:
//! - [`CallRequest`]: a validated, immutable completion request
//! - [`CallOutcome`]: what a successful resilient call hands back
//! - [`CallEvent`] and [`CallReporter`]: the lifecycle events a call emits
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: nothing in this crate talks to the network
//! 2. **Validated requests**: a `CallRequest` always has a model and at least one message
//! 3. **Immutable**: rewriting a request produces a new value
//!
//! ## Example
//!
//! ```rust
//! use tether_core::CallRequest;
//!
//! let request = CallRequest::builder("gpt-5")
//!     .system("Answer in one sentence.")
//!     .user("What is backoff?")
//!     .option("reasoning_effort", "low")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.messages().len(), 2);
//! ```

pub mod event;
pub mod message;
pub mod outcome;
pub mod request;

pub use event::{CallEvent, CallReporter, FailureKind, NullReporter, TracingReporter};
pub use message::{ChatMessage, Role};
pub use outcome::{CallOutcome, CompletionResponse, TokenUsage};
pub use request::{CallOptions, CallRequest, CallRequestBuilder, RequestError};
