//! Fallback to a more widely available model.
//!
//! When the requested model is rejected as unavailable, the request is sent
//! once more to the fallback model. Options that only the primary model
//! family understands are removed first; everything else is kept.

use tether_core::{CallRequest, RequestError};

use super::retry::PolicyError;

/// Default fallback model.
pub const DEFAULT_FALLBACK_MODEL: &str = "gpt-4o";

/// Options stripped from the request before it goes to the fallback model.
pub const DEFAULT_PRIMARY_ONLY_OPTIONS: &[&str] = &["reasoning_effort", "verbosity"];

/// Which model to fall back to and what to strip on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    model: String,
    primary_only_options: Vec<String>,
}

impl FallbackPolicy {
    /// Fall back to `model`, stripping the default primary-only options.
    pub fn new(model: impl Into<String>) -> Result<Self, PolicyError> {
        Self::with_primary_only_options(
            model,
            DEFAULT_PRIMARY_ONLY_OPTIONS.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Fall back to `model`, stripping exactly `options`.
    pub fn with_primary_only_options(
        model: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, PolicyError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(PolicyError::EmptyFallbackModel);
        }

        Ok(Self {
            model,
            primary_only_options: options,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn primary_only_options(&self) -> &[String] {
        &self.primary_only_options
    }

    /// The request to send to the fallback model.
    pub fn fallback_request(&self, request: &CallRequest) -> Result<CallRequest, RequestError> {
        request.retarget(self.model.as_str(), self.primary_only_options.as_slice())
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            model: DEFAULT_FALLBACK_MODEL.to_string(),
            primary_only_options: DEFAULT_PRIMARY_ONLY_OPTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ChatMessage;

    #[test]
    fn test_default_policy() {
        let policy = FallbackPolicy::default();
        assert_eq!(policy.model(), "gpt-4o");
        assert_eq!(policy.primary_only_options(), &["reasoning_effort", "verbosity"]);
    }

    #[test]
    fn test_rejects_empty_model() {
        assert_eq!(FallbackPolicy::new(""), Err(PolicyError::EmptyFallbackModel));
    }

    #[test]
    fn test_fallback_request_strips_primary_options() {
        let request = CallRequest::builder("gpt-5")
            .system("Be terse.")
            .user("Summarize this.")
            .option("reasoning_effort", "minimal")
            .option("verbosity", "low")
            .option("temperature", 0.3)
            .option("max_completion_tokens", 300)
            .build()
            .unwrap();

        let fallback = FallbackPolicy::new("backup")
            .unwrap()
            .fallback_request(&request)
            .unwrap();

        assert_eq!(fallback.model(), "backup");
        assert_eq!(
            fallback.messages(),
            &[ChatMessage::system("Be terse."), ChatMessage::user("Summarize this.")]
        );
        assert_eq!(fallback.options().len(), 2);
        assert!(fallback.options().contains("temperature"));
        assert!(fallback.options().contains("max_completion_tokens"));
    }

    #[test]
    fn test_custom_primary_only_options() {
        let request = CallRequest::builder("o3")
            .user("hi")
            .option("reasoning_effort", "high")
            .option("store", true)
            .build()
            .unwrap();

        let policy =
            FallbackPolicy::with_primary_only_options("gpt-4o-mini", vec!["store".to_string()])
                .unwrap();
        let fallback = policy.fallback_request(&request).unwrap();

        assert!(fallback.options().contains("reasoning_effort"));
        assert!(!fallback.options().contains("store"));
    }
}
