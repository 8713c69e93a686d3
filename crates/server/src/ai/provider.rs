// Language-model provider client.
//
// `Provider` abstracts the upstream API so the protocol can be exercised
// with mocks; the production implementation speaks a messages-style chat
// API over reqwest. One attempt per invocation — no retry, and the only
// cancellation is the caller's wall-clock timeout.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

#[async_trait]
pub trait Provider: Send + Sync {
    /// One completion attempt: system instruction + user message + output
    /// token budget, returning the generated text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the credential.
    #[error("auth error: {message}")]
    Auth { message: String },

    /// The provider asked us to back off.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// Any other upstream API error.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String, code: Option<String> },

    /// 2xx response whose body did not carry generated text.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";

/// Production provider over the messages API.
pub struct MessagesProvider {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl MessagesProvider {
    pub fn new(base_url: Url, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Provider for MessagesProvider {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let url = self.base_url.join(MESSAGES_PATH).map_err(|error| {
            ProviderError::MalformedResponse(format!("invalid messages endpoint: {error}"))
        })?;

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        });

        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &text));
        }

        extract_generated_text(&text)
    }
}

/// Map an upstream error response onto the provider taxonomy.
pub fn classify_failure(status: u16, body: &str) -> ProviderError {
    let info = parse_api_error(body, status);
    match status {
        401 | 403 => ProviderError::Auth { message: info.message },
        429 => ProviderError::RateLimited { message: info.message },
        _ => ProviderError::Api { status, message: info.message, code: info.code },
    }
}

struct ApiErrorInfo {
    message: String,
    code: Option<String>,
}

/// Parse an API error body.
///
/// Handles the standard envelope `{"error": {"message", "type"}}` and the
/// flat `{"message", "code"}` shape, falling back to the raw body text.
fn parse_api_error(body: &str, status: u16) -> ApiErrorInfo {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value["error"]["message"].as_str() {
            let code = value["error"]["type"].as_str().map(String::from);
            return ApiErrorInfo { message: message.to_string(), code };
        }
        if let Some(message) = value["message"].as_str() {
            let code = value["code"].as_str().map(String::from);
            return ApiErrorInfo { message: message.to_string(), code };
        }
    }
    ApiErrorInfo { message: format!("HTTP {status}: {body}"), code: None }
}

/// Pull the generated text out of a messages-API success body: the
/// concatenation of every `content` entry of type `text`.
fn extract_generated_text(body: &str) -> Result<String, ProviderError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|error| ProviderError::MalformedResponse(error.to_string()))?;

    let blocks = value["content"]
        .as_array()
        .ok_or_else(|| ProviderError::MalformedResponse("missing content array".to_string()))?;

    let text: String = blocks
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();

    if text.is_empty() {
        return Err(ProviderError::MalformedResponse("no text blocks in content".to_string()));
    }
    Ok(text)
}
