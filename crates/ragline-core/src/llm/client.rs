//! Shared HTTP plumbing for external LLM services (Ollama, OpenAI-compatible, cloud)

use crate::error::{RagError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Build the message list for a prompt with an optional system instruction
pub fn build_messages(prompt: &str, system: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system.filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

/// Create an HTTP client whose requests time out after `timeout_secs`
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Create an HTTP client for streamed bodies.
///
/// `timeout_secs` bounds connecting and each read, so a stream that keeps
/// producing is never cut off, while a stalled one still times out.
pub fn streaming_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(timeout_secs);
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Endpoint missing on this server version, worth trying an alternative
pub fn is_unsupported_endpoint(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED
}

/// Turn a non-success response into a classified error
pub async fn status_error(service: &str, response: reqwest::Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    RagError::from_status(service, status, &body)
}

/// POST an OpenAI-compatible `/v1/chat/completions` request and return the first choice
pub async fn chat_completion(
    http: &reqwest::Client,
    service: &str,
    base_url: &str,
    model: &str,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: Vec<ChatMessage>,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        #[serde(default)]
        choices: Vec<ChatChoice>,
    }

    #[derive(Deserialize)]
    struct ChatChoice {
        message: ChatMessage,
    }

    let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
    let request = ChatRequest { model, messages };

    let response = http
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(|e| RagError::from_http(service, e))?;

    if !response.status().is_success() {
        return Err(status_error(service, response).await);
    }

    let chat_response: ChatResponse = response
        .json()
        .await
        .map_err(|e| RagError::from_http(service, e))?;

    chat_response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| {
            RagError::UpstreamProtocol(format!("{}: chat completion returned no choices", service))
        })
}
