//! OpenAI chat completions provider.
//!
//! Talks to `POST {base_url}/chat/completions`. Any OpenAI-compatible server
//! can be used by pointing `base_url` at it.
//!
//! Provider settings:
//!
//! ```yaml
//! api_key: sk-...            # falls back to OPENAI_API_KEY
//! organization: org-...      # falls back to OPENAI_ORG_ID
//! base_url: https://...      # http(s) only
//! timeout_secs: 60           # per request, at least 1
//! ```

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    CompletionClient, ProviderError,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{CallOptions, ChatMessage, CompletionResponse, TokenUsage};

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable name for the OpenAI organization id.
pub const OPENAI_ORG_ENV: &str = "OPENAI_ORG_ID";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// API key plus the optional organization header.
#[derive(Debug)]
pub struct OpenAiCredentials {
    pub api_key: ApiCredential,
    pub organization: Option<ApiCredential>,
}

impl OpenAiCredentials {
    /// Load from provider settings, falling back to the environment.
    pub fn load(settings: &JsonValue) -> Result<Self, ProviderError> {
        let api_key = ApiCredential::lookup(settings, "api_key", OPENAI_API_KEY_ENV)?
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "OpenAI API key required: set 'api_key' in provider settings or {}",
                    OPENAI_API_KEY_ENV
                ))
            })?;
        let organization = ApiCredential::lookup(settings, "organization", OPENAI_ORG_ENV)?;

        Ok(Self {
            api_key,
            organization,
        })
    }
}

/// Non-secret provider settings.
#[derive(Debug, Default, Deserialize)]
struct OpenAiSettings {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl OpenAiSettings {
    fn parse(settings: &JsonValue) -> Result<Self, ProviderError> {
        if settings.is_null() {
            return Ok(Self::default());
        }

        let parsed = Self::deserialize(settings)
            .map_err(|e| ProviderError::NotConfigured(format!("invalid openai settings: {e}")))?;

        if let Some(url) = &parsed.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(format!(
                    "base_url must start with http:// or https://, got '{url}'"
                )));
            }
        }
        if parsed.timeout_secs == Some(0) {
            return Err(ProviderError::NotConfigured(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(parsed)
    }
}

/// OpenAI chat completions provider.
pub struct OpenAiProvider {
    credentials: OpenAiCredentials,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credentials", &self.credentials)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credentials(OpenAiCredentials {
            api_key: ApiCredential::new(api_key, CredentialSource::Programmatic),
            organization: None,
        })
    }

    /// Create from `OPENAI_API_KEY` and `OPENAI_ORG_ID`.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_config(&JsonValue::Null)
    }

    /// Create from provider settings, rejecting values it cannot use.
    pub fn from_config(settings: &JsonValue) -> Result<Self, ProviderError> {
        let parsed = OpenAiSettings::parse(settings)?;
        let mut provider = Self::with_credentials(OpenAiCredentials::load(settings)?);

        if let Some(url) = parsed.base_url {
            provider = provider.with_base_url(url);
        }
        if let Some(secs) = parsed.timeout_secs {
            provider = provider.with_timeout(Duration::from_secs(secs));
        }

        Ok(provider)
    }

    fn with_credentials(credentials: OpenAiCredentials) -> Self {
        Self {
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the JSON body for a chat completion.
///
/// Options are merged at the top level; `model` and `messages` always win.
fn build_body(model: &str, messages: &[ChatMessage], options: &CallOptions) -> JsonValue {
    let mut body = Map::new();
    for (key, value) in options.iter() {
        body.insert(key.clone(), value.clone());
    }
    body.insert("model".to_string(), JsonValue::from(model));
    body.insert(
        "messages".to_string(),
        serde_json::to_value(messages).unwrap_or(JsonValue::Array(Vec::new())),
    );
    JsonValue::Object(body)
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// Turn a successful response body into a [`CompletionResponse`].
fn parse_completion(raw: JsonValue) -> Result<CompletionResponse, ProviderError> {
    let body: ChatCompletion = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::ParseError(e.to_string()))?;

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("response contained no choices".to_string()))?;

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cached_tokens: u.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
            reasoning_tokens: u.completion_tokens_details.map_or(0, |d| d.reasoning_tokens),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: body.model,
        stop_reason: choice.finish_reason,
        raw,
    })
}

/// Classify a non-success response body.
fn parse_error(model: &str, status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<OpenAiError>(body) {
        Ok(err) => ProviderError::from_api_response(
            model,
            status,
            err.error.code.as_deref(),
            err.error.message,
        ),
        Err(_) => ProviderError::from_api_response(model, status, None, body),
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("retry-after-ms")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .or_else(|| {
            header("retry-after")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
        })
}

#[async_trait]
impl CompletionClient for OpenAiProvider {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CallOptions,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = build_body(model, messages, options);

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credentials.api_key.expose())
            .timeout(self.timeout)
            .json(&body);

        if let Some(org) = &self.credentials.organization {
            request = request.header("OpenAI-Organization", org.expose());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::HttpError(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if status == 408 || status == 504 {
            return Err(ProviderError::Timeout(self.timeout));
        }

        if !response.status().is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| ProviderError::HttpError(e.to_string()))?;
            return Err(parse_error(model, status, &text));
        }

        let raw: JsonValue = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout)
            } else {
                ProviderError::ParseError(e.to_string())
            }
        })?;

        parse_completion(raw)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Registers the `openai` provider type.
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn validate_config(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        OpenAiSettings::parse(settings)?;
        OpenAiCredentials::load(settings)?;
        Ok(())
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn CompletionClient>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_config(settings)?))
    }

    fn description(&self) -> &'static str {
        "OpenAI chat completions (and compatible servers)"
    }
}
