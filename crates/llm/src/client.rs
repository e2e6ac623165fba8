//! HTTP client for an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::GenerationError;
use crate::messages::{ChatCompletionBody, ChatCompletionResponse, ChatRequest};

/// Default endpoint (Groq's OpenAI-compatible API).
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default model.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that can turn a chat request into text.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Send one request and return the first choice's text. No retries.
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError>;
}

/// [`CodeGenerator`] backed by a chat-completions HTTP endpoint.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsClient {
    /// Create a client. `timeout` bounds each request end to end.
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
            timeout,
        }
    }

    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The POST for one completion, carrying the request timeout.
    fn build_request(&self, body: &ChatCompletionBody<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GenerationError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CodeGenerator for ChatCompletionsClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        if !self.is_configured() {
            return Err(GenerationError::NotConfigured);
        }

        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        tracing::debug!(model = %self.model, max_tokens = request.max_tokens, "Sending chat completion");

        let response = self.build_request(&body).send().await?;

        let parsed: ChatCompletionResponse = Self::ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        first_choice_text(parsed)
    }
}

/// Text of the first choice, rejecting missing or blank content.
pub(crate) fn first_choice_text(response: ChatCompletionResponse) -> Result<String, GenerationError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("no choices in response".to_string()))?;

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::InvalidResponse(
            "first choice has no content".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
