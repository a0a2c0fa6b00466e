//! Completion requests.
//!
//! A [`CallRequest`] is validated once at construction and never mutated
//! afterwards. Rewriting a request (for example to target a fallback model)
//! always produces a new value.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::message::ChatMessage;

/// Errors that can occur when building a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Model identifier must not be empty")]
    EmptyModel,

    #[error("Request must contain at least one message")]
    NoMessages,
}

/// Provider-specific options passed through uninterpreted.
///
/// Keys are kept sorted so serialized requests are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CallOptions(BTreeMap<String, JsonValue>);

impl CallOptions {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`CallOptions::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up an option.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Check whether an option is set.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy of these options with the given keys removed.
    pub fn without<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        let mut options = self.0.clone();
        for key in keys {
            options.remove(key.as_ref());
        }
        Self(options)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, JsonValue>> for CallOptions {
    fn from(map: BTreeMap<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, JsonValue)> for CallOptions {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The parameters of one completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRequest {
    model: String,
    messages: Vec<ChatMessage>,
    options: CallOptions,
}

impl CallRequest {
    /// Create a validated request.
    ///
    /// The model identifier must be non-blank and at least one message is
    /// required.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> Result<Self, RequestError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RequestError::EmptyModel);
        }
        if messages.is_empty() {
            return Err(RequestError::NoMessages);
        }

        Ok(Self {
            model,
            messages,
            options,
        })
    }

    /// Start building a request for a model.
    pub fn builder(model: impl Into<String>) -> CallRequestBuilder {
        CallRequestBuilder {
            model: model.into(),
            messages: Vec::new(),
            options: CallOptions::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// A copy of this request aimed at another model, with some options dropped.
    ///
    /// Messages and every other option are carried over unchanged.
    pub fn retarget<S: AsRef<str>>(
        &self,
        model: impl Into<String>,
        drop_options: &[S],
    ) -> Result<Self, RequestError> {
        Self::new(
            model,
            self.messages.clone(),
            self.options.without(drop_options),
        )
    }
}

/// Builder for [`CallRequest`].
#[derive(Debug, Clone)]
pub struct CallRequestBuilder {
    model: String,
    messages: Vec<ChatMessage>,
    options: CallOptions,
}

impl CallRequestBuilder {
    /// Append a message.
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Append a system message.
    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::system(content))
    }

    /// Append a user message.
    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::user(content))
    }

    /// Set a provider-specific option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.options.insert(key, value);
        self
    }

    /// Replace all options.
    pub fn options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<CallRequest, RequestError> {
        CallRequest::new(self.model, self.messages, self.options)
    }
}
