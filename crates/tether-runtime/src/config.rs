//! Runtime configuration loaded from YAML or JSON.
//!
//! ```yaml
//! model: gpt-5
//! provider:
//!   type: openai
//!   settings:
//!     timeout_secs: 30
//! retry:
//!   max_retries: 5
//!   backoff_unit: 1s
//!   max_delay: 1m
//! fallback:
//!   model: gpt-4o
//!   primary_only_options: [reasoning_effort, verbosity]
//! ```
//!
//! Every section and field is optional.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{
    FallbackPolicy, PolicyError, RetryPolicy, DEFAULT_BACKOFF_UNIT, DEFAULT_FALLBACK_MODEL,
    DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_PRIMARY_ONLY_OPTIONS,
};

/// Default primary model.
pub const DEFAULT_MODEL: &str = "gpt-5";

/// Default provider type.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] PolicyError),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Primary model for requests that don't name one
    pub model: String,

    pub provider: ProviderSettings,

    pub retry: RetrySettings,

    pub fallback: FallbackSettings,
}

/// Which provider to build and its free-form settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Passed unchanged to the provider factory
    pub settings: JsonValue,
}

/// Retry timing for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub max_retries: u32,

    /// Wait before the first retry, e.g. `"1s"` or `"500ms"`
    #[serde(with = "duration_str")]
    pub backoff_unit: Duration,

    /// Upper bound for a single wait
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

/// Fallback model selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub model: String,

    /// Options removed before the fallback attempt
    pub primary_only_options: Vec<String>,
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider: ProviderSettings::default(),
            retry: RetrySettings::default(),
            fallback: FallbackSettings::default(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_type: DEFAULT_PROVIDER.to_string(),
            settings: JsonValue::Object(Default::default()),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl Default for FallbackSettings {
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

impl RuntimeConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Serialize the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that the configuration can build working policies.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField("model".to_string()));
        }
        if self.provider.provider_type.trim().is_empty() {
            return Err(ConfigError::MissingField("provider.type".to_string()));
        }

        self.retry_policy()?;
        self.fallback_policy()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, PolicyError> {
        RetryPolicy::with_timing(
            self.retry.max_retries,
            self.retry.backoff_unit,
            self.retry.max_delay,
        )
    }

    pub fn fallback_policy(&self) -> Result<FallbackPolicy, PolicyError> {
        FallbackPolicy::with_primary_only_options(
            self.fallback.model.clone(),
            self.fallback.primary_only_options.clone(),
        )
    }
}
