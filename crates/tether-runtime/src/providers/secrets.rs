//! Redacted API credentials.
//!
//! Keys are wrapped in [`ApiCredential`] as soon as they are read so they stay
//! out of `Debug`/`Display` output, error messages and `tracing` fields. The
//! plain value is reachable only through [`ApiCredential::expose`].

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Settings,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialSource::Settings => "provider settings",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "code",
        })
    }
}

pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
        }
    }

    /// Look up `key` in provider settings, then `env_var`.
    ///
    /// Returns `Ok(None)` when neither is set. A settings value that is not a
    /// string is an error rather than a silent fall-through to the environment.
    pub fn lookup(
        settings: &JsonValue,
        key: &str,
        env_var: &str,
    ) -> Result<Option<Self>, ProviderError> {
        match settings.get(key) {
            Some(JsonValue::String(value)) => {
                return Ok(Some(Self::new(value.as_str(), CredentialSource::Settings)))
            }
            Some(JsonValue::Null) | None => {}
            Some(_) => {
                return Err(ProviderError::NotConfigured(format!(
                    "'{key}' must be a string"
                )))
            }
        }

        Ok(std::env::var(env_var)
            .ok()
            .map(|value| Self::new(value, CredentialSource::Environment)))
    }

    /// The plain value, for the request header only.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCredential([REDACTED] from {})", self.source)
    }
}
