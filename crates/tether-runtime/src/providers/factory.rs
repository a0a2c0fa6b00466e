//! Building completion clients from the `provider` config section.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let client = registry.create(&config.provider.provider_type, &config.provider.settings)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{CompletionClient, ProviderError};

/// Builds one kind of completion client from free-form settings.
pub trait ProviderFactory: Send + Sync {
    /// Name used in `provider.type`, e.g. "openai".
    fn provider_type(&self) -> &'static str;

    /// Reject settings this provider cannot use.
    fn validate_config(&self, _settings: &JsonValue) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Build a client. Only called with settings that passed validation.
    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn CompletionClient>, ProviderError>;

    fn description(&self) -> &'static str {
        "Completion provider"
    }
}

/// Provider factories keyed by type name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// Add a factory, replacing any with the same type name.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider_type(), factory);
    }

    /// Validate `settings` and build a client of `provider_type`.
    pub fn create(
        &self,
        provider_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn CompletionClient>, ProviderError> {
        let factory = self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "unknown provider type '{}' (available: {})",
                provider_type,
                self.factories.keys().copied().collect::<Vec<_>>().join(", ")
            ))
        })?;

        factory.validate_config(settings)?;
        factory.create(settings)
    }

    /// `(type, description)` for each registered provider, sorted by type.
    pub fn providers(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.factories
            .iter()
            .map(|(name, factory)| (*name, factory.description()))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_core::{CallOptions, ChatMessage, CompletionResponse};

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(
            &self,
            model: &str,
            messages: &[ChatMessage],
            _options: &CallOptions,
        ) -> Result<CompletionResponse, ProviderError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse::text(model, last))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Accepts only settings without a `reject` key and counts builds.
    #[derive(Default)]
    struct EchoFactory {
        built: AtomicUsize,
    }

    impl ProviderFactory for EchoFactory {
        fn provider_type(&self) -> &'static str {
            "echo"
        }

        fn validate_config(&self, settings: &JsonValue) -> Result<(), ProviderError> {
            match settings.get("reject") {
                Some(_) => Err(ProviderError::NotConfigured("rejected".to_string())),
                None => Ok(()),
            }
        }

        fn create(&self, _settings: &JsonValue) -> Result<Arc<dyn CompletionClient>, ProviderError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoClient))
        }

        fn description(&self) -> &'static str {
            "Echoes the last message back"
        }
    }

    #[tokio::test]
    async fn test_created_client_completes() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory::default()));

        let client = registry.create("echo", &serde_json::json!({})).unwrap();
        let response = client
            .complete("m", &[ChatMessage::user("ping")], &CallOptions::new())
            .await
            .unwrap();
        assert_eq!(response.content, "ping");
    }

    #[test]
    fn test_create_validates_before_building() {
        let factory = Arc::new(EchoFactory::default());
        let mut registry = ProviderRegistry::new();
        registry.register(factory.clone());

        let result = registry.create("echo", &serde_json::json!({"reject": true}));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_provider_lists_available() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory::default()));

        match registry.create("nope", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("'nope'"));
                assert!(msg.contains("echo"));
            }
            _ => panic!("expected NotConfigured"),
        }
    }

    #[test]
    fn test_providers_listing() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoFactory::default()));

        assert_eq!(
            registry.providers().collect::<Vec<_>>(),
            vec![("echo", "Echoes the last message back")]
        );
    }
}
