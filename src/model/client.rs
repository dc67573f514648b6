//! Model client for chat completions over an OpenAI-compatible API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry, in seconds. Doubles per attempt.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 1;

/// Default completion endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default completion length.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

const REFERER: &str = "https://webmcp-automation.local";
const APP_TITLE: &str = "WebMCP Browser Automation";

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

/// Coarse failure classes used for logging and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Unauthorized,
    QuotaExhausted,
    Other,
}

impl ModelError {
    /// Classify a non-success HTTP response.
    pub fn from_response(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let lower = body.to_lowercase();
        if lower.contains("insufficient_quota") {
            Self::QuotaExhausted(body)
        } else if status == 429 || lower.contains("rate_limit") {
            Self::RateLimited(body)
        } else if status == 401 || lower.contains("unauthorized") {
            Self::Unauthorized(body)
        } else {
            Self::ApiError { status, body }
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::RateLimited(_) => FailureKind::RateLimited,
            Self::Unauthorized(_) => FailureKind::Unauthorized,
            Self::QuotaExhausted(_) => FailureKind::QuotaExhausted,
            _ => FailureKind::Other,
        }
    }

    /// Connection failures and server errors are worth retrying; rate,
    /// auth and quota failures are not.
    fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(e) => !e.is_decode(),
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Build a request with a system and a user message.
    pub fn new(
        model: impl Into<String>,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                MessageBuilder::create_system_message(system_prompt),
                MessageBuilder::create_user_message(user_prompt),
            ],
            temperature,
            max_tokens,
        }
    }

    /// Text of the first message with the given role.
    pub fn message_content(&self, role: &str) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message["role"] == role)
            .and_then(|message| message["content"].as_str())
    }

    fn body(&self) -> Value {
        json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Return the raw text content of the first choice.
    async fn chat(&self, request: &ChatRequest) -> Result<String, ModelError>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay before the first retry in seconds.
    pub retry_delay_secs: u64,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ModelConfig {
    /// Create a new ModelConfig with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new ModelConfig with custom API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay before the first retry in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: String,
}

/// HTTP client for OpenAI-compatible chat completion endpoints.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send a request, retrying transport failures with exponential backoff.
    async fn request(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let url = self.config.endpoint();
        let body = request.body();

        let mut last_error: Option<ModelError> = None;
        let max_attempts = self.config.max_retries + 1; // +1 for the initial attempt
        let mut delay = Duration::from_secs(self.config.retry_delay_secs);

        for attempt in 1..=max_attempts {
            match self.send_request(&url, &body).await {
                Ok(content) => return Ok(content),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            model = %request.model,
                            "Request failed (attempt {}/{}): {}; retrying in {:?}",
                            attempt,
                            max_attempts,
                            e,
                            delay
                        );
                        sleep(delay).await;
                        delay *= 2;
                    }
                    last_error = Some(e);
                }
            }
        }

        // All retries exhausted
        Err(ModelError::MaxRetriesExceeded(
            max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }

    /// Send a single request to the API.
    async fn send_request(&self, url: &str, body: &Value) -> Result<String, ModelError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::from_response(status.as_u16(), error_text));
        }

        let raw = response.text().await?;
        parse_completion(&raw)
    }
}

#[async_trait]
impl ChatBackend for ModelClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String, ModelError> {
        self.request(request).await
    }
}

/// Extract the first choice's content from a completion body.
fn parse_completion(raw: &str) -> Result<String, ModelError> {
    let completion: ChatCompletionResponse =
        serde_json::from_str(raw).map_err(|e| ModelError::ParseError(e.to_string()))?;

    if let Some(error) = completion.error {
        let status = error
            .code
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        return Err(ModelError::from_response(status, error.message));
    }

    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| ModelError::ParseError("No choices in response".to_string()))
}

/// Helper for building conversation messages.
pub struct MessageBuilder;

impl MessageBuilder {
    /// Create a system message.
    pub fn create_system_message(content: &str) -> Value {
        json!({
            "role": "system",
            "content": content
        })
    }

    /// Create a user message.
    pub fn create_user_message(content: &str) -> Value {
        json!({
            "role": "user",
            "content": content
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(
            config.with_base_url("http://localhost:8000/v1/").endpoint(),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(
            ModelError::from_response(429, "slow down").failure_kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            ModelError::from_response(400, "{\"type\": \"rate_limit_exceeded\"}").failure_kind(),
            FailureKind::RateLimited
        );
        assert_eq!(
            ModelError::from_response(401, "bad key").failure_kind(),
            FailureKind::Unauthorized
        );
        assert_eq!(
            ModelError::from_response(429, "insufficient_quota").failure_kind(),
            FailureKind::QuotaExhausted
        );
        assert_eq!(
            ModelError::from_response(502, "bad gateway").failure_kind(),
            FailureKind::Other
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ModelError::from_response(503, "unavailable").is_retryable());
        assert!(!ModelError::from_response(429, "slow down").is_retryable());
        assert!(!ModelError::from_response(401, "nope").is_retryable());
        assert!(!ModelError::ParseError("x".to_string()).is_retryable());
    }

    #[test]
    fn test_parse_completion() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#;
        assert_eq!(parse_completion(raw).unwrap(), "[]");

        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        assert_eq!(parse_completion(raw).unwrap(), "");

        let raw = r#"{"choices": []}"#;
        assert!(matches!(parse_completion(raw), Err(ModelError::ParseError(_))));
    }

    #[test]
    fn test_parse_completion_embedded_error() {
        let raw = r#"{"error": {"code": 429, "message": "Rate limit exceeded"}}"#;
        assert_eq!(
            parse_completion(raw).unwrap_err().failure_kind(),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn test_chat_request_messages() {
        let request = ChatRequest::new("m", "system text", "user text", 0.1, 2000);
        assert_eq!(request.message_content("system"), Some("system text"));
        assert_eq!(request.message_content("user"), Some("user text"));

        let body = request.body();
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][1]["role"], "user");
    }
}
