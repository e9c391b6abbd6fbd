//! Boundary to the hosted text-completion service.
//!
//! The pipeline only ever sees [`CompletionClient`]: a prompt goes in, generated text comes out.
//! [`OpenAiCompatibleClient`] speaks the chat-completions protocol shared by Groq and OpenAI, and
//! [`ResilientClient`] layers per-call timeouts and bounded retries on top of any client.

mod resilient;

pub use resilient::{ResilientClient, RetryPolicy};

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    /// Endpoint could not be reached.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider rejected the request because of quota or rate limits.
    #[error("Completion provider rate limited the request: {0}")]
    RateLimited(String),
    /// Call did not finish within the per-call timeout.
    #[error("Completion call timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Provider returned a non-success status.
    #[error("Failed to generate completion (status {status}): {message}")]
    GenerationFailed {
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body or diagnostic text.
        message: String,
    },
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Whether a fresh attempt has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Timeout(_) => true,
            Self::GenerationFailed { status, .. } => *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// One completion call: `complete(prompt, temperature, model_id)`.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Model identifier understood by the provider.
    pub model: String,
}

/// Interface implemented by text-completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate text for the given prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Builds a client bound to one request's credential.
pub trait CompletionProvider: Send + Sync {
    /// Construct a client that authenticates with `credential`.
    fn client_for(&self, credential: &Credential) -> Box<dyn CompletionClient>;
}

/// API key for the completion service.
///
/// The value is never printed: `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw key, returning `None` for blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Raw key for the `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    credential: Credential,
}

impl OpenAiCompatibleClient {
    /// Create a client for the given endpoint and key.
    pub fn new(http: Client, base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credential,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let payload = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.credential.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::RateLimited(body));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                CompletionError::InvalidResponse("completion contained no message content".into())
            })
    }
}

/// Provider that talks to the configured hosted endpoint.
pub struct HostedProvider {
    http: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl HostedProvider {
    /// Build a provider from runtime configuration.
    pub fn from_config(config: &Config) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent("docsum/completion")
            .build()
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            policy: RetryPolicy {
                timeout: config.completion_timeout(),
                max_retries: config.completion_max_retries,
                backoff: config.completion_retry_backoff(),
            },
        })
    }
}

impl CompletionProvider for HostedProvider {
    fn client_for(&self, credential: &Credential) -> Box<dyn CompletionClient> {
        let inner = OpenAiCompatibleClient::new(
            self.http.clone(),
            self.base_url.clone(),
            credential.clone(),
        );
        Box::new(ResilientClient::new(inner, self.policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "Summarize".into(),
            temperature: 0.2,
            model: "llama-3.3-70b-versatile".into(),
        }
    }

    fn client(server: &MockServer) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(
            Client::builder()
                .user_agent("docsum-test")
                .build()
                .expect("client"),
            server.base_url(),
            Credential::new("test-key").expect("credential"),
        )
    }

    #[tokio::test]
    async fn chat_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body_partial(r#"{"model":"llama-3.3-70b-versatile"}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  Summary text \n" } }
                    ]
                }));
            })
            .await;

        let summary = client(&server).complete(request()).await.expect("summary");

        mock.assert_async().await;
        assert_eq!(summary, "Summary text");
    }

    #[tokio::test]
    async fn chat_client_maps_rate_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("slow down");
            })
            .await;

        let error = client(&server)
            .complete(request())
            .await
            .expect_err("rate limited");

        assert!(matches!(error, CompletionError::RateLimited(ref body) if body == "slow down"));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn chat_client_maps_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("bad key");
            })
            .await;

        let error = client(&server)
            .complete(request())
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            CompletionError::GenerationFailed { status: 401, .. }
        ));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn chat_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .complete(request())
            .await
            .expect_err("malformed");

        assert!(matches!(error, CompletionError::InvalidResponse(_)));
    }

    #[test]
    fn credential_rejects_blank_and_redacts_debug() {
        assert!(Credential::new("   ").is_none());
        let credential = Credential::new(" gsk_secret ").expect("credential");
        assert_eq!(credential.expose(), "gsk_secret");
        assert!(!format!("{credential:?}").contains("gsk_secret"));
    }
}
