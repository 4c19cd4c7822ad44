//! Ollama-backed embedder and generator
//!
//! Ollama has moved its embedding and generation endpoints around between
//! releases, so both clients probe the newer endpoint first and step back to
//! older ones when the server answers 404/405.

use super::client::{
    build_messages, chat_completion, http_client, is_unsupported_endpoint, status_error,
    streaming_http_client,
};
use super::ndjson::NdjsonDecoder;
use super::{single_fragment, Embedder, Generator, TextStream};
use crate::config::OllamaConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;

const SERVICE: &str = "ollama";

/// Outcome of one embedding endpoint attempt
enum Attempt {
    Unsupported,
    Vectors(Vec<Vec<f32>>),
}

/// Embedder backed by an Ollama (or OpenAI-compatible) server
pub struct OllamaEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Create from configuration
    pub fn from_config(config: &OllamaConfig) -> Result<Self> {
        Self::new(&config.base_url, &config.embed_model, config.timeout_secs)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))?;

        let status = response.status();
        if is_unsupported_endpoint(status) {
            tracing::debug!("Embedding endpoint {} not supported ({})", path, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let value = response
            .json()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))?;
        Ok(Some(value))
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Attempt> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        match self.post("/v1/embeddings", &body).await? {
            Some(value) => Ok(Attempt::Vectors(parse_vectors(&value)?)),
            None => Ok(Attempt::Unsupported),
        }
    }

    async fn embed_batch_api(&self, texts: &[String]) -> Result<Attempt> {
        let body = serde_json::json!({ "model": self.model, "input": texts });
        match self.post("/api/embed", &body).await? {
            Some(value) => Ok(Attempt::Vectors(parse_vectors(&value)?)),
            None => Ok(Attempt::Unsupported),
        }
    }

    async fn embed_legacy(&self, texts: &[String]) -> Result<Attempt> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({ "model": self.model, "prompt": text });
            match self.post("/api/embeddings", &body).await? {
                Some(value) => vectors.extend(parse_vectors(&value)?),
                None => return Ok(Attempt::Unsupported),
            }
        }
        Ok(Attempt::Vectors(vectors))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = None;
        for attempt in 0..3 {
            let outcome = match attempt {
                0 => self.embed_openai(texts).await?,
                1 => self.embed_batch_api(texts).await?,
                _ => self.embed_legacy(texts).await?,
            };
            if let Attempt::Vectors(v) = outcome {
                vectors = Some(v);
                break;
            }
        }

        let vectors = vectors.ok_or_else(|| {
            RagError::UpstreamProtocol(format!(
                "{}: no supported embedding endpoint at {}",
                SERVICE, self.base_url
            ))
        })?;

        if vectors.len() != texts.len() {
            return Err(RagError::UpstreamProtocol(format!(
                "{}: expected {} embeddings, got {}",
                SERVICE,
                texts.len(),
                vectors.len()
            )));
        }

        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull embedding vectors out of any of the response shapes Ollama and
/// OpenAI-compatible servers produce.
pub fn parse_vectors(value: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(data) = value.get("data").and_then(Value::as_array) {
        return data
            .iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(as_vector)
                    .ok_or_else(|| malformed("data[].embedding"))
            })
            .collect();
    }

    let field = value
        .get("embeddings")
        .or_else(|| value.get("embedding"))
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("embeddings"))?;

    // A flat list of numbers is a single vector
    if field.first().map(Value::is_number).unwrap_or(false) {
        let vector = as_vector(&Value::Array(field.clone())).ok_or_else(|| malformed("embedding"))?;
        return Ok(vec![vector]);
    }

    field
        .iter()
        .map(|item| as_vector(item).ok_or_else(|| malformed("embeddings[]")))
        .collect()
}

fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|x| x as f32))
        .collect()
}

fn malformed(field: &str) -> RagError {
    RagError::UpstreamProtocol(format!("{}: missing or malformed `{}` in response", SERVICE, field))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// One line of an `/api/generate` response
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Generator backed by a local Ollama server
pub struct OllamaGenerator {
    http: reqwest::Client,
    /// Idle-timeout client for `/api/generate` streams
    stream_http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            stream_http: streaming_http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Create from configuration, optionally replacing the configured model
    pub fn from_config(config: &OllamaConfig, model_override: Option<&str>) -> Result<Self> {
        let model = model_override.unwrap_or(&config.llm_model);
        Self::new(&config.base_url, model, config.timeout_secs)
    }

    async fn send_generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: system.unwrap_or(""),
            stream,
        };
        let http = if stream { &self.stream_http } else { &self.http };
        http.post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))
    }

    async fn chat(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        chat_completion(
            &self.http,
            SERVICE,
            &self.base_url,
            &self.model,
            build_messages(prompt, system),
        )
        .await
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let response = self.send_generate(prompt, system, false).await?;
        let status = response.status();

        if is_unsupported_endpoint(status) {
            tracing::debug!("/api/generate not supported ({}), using chat completions", status);
            return self.chat(prompt, system).await;
        }
        if !status.is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let line: GenerateLine = response
            .json()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))?;
        if let Some(error) = line.error {
            return Err(RagError::UpstreamProtocol(format!("{}: {}", SERVICE, error)));
        }
        line.response.ok_or_else(|| malformed("response"))
    }

    async fn stream(&self, prompt: &str, system: Option<&str>) -> Result<TextStream> {
        let response = self.send_generate(prompt, system, true).await?;
        let status = response.status();

        if is_unsupported_endpoint(status) {
            tracing::debug!("/api/generate not supported ({}), streaming one chat completion", status);
            let text = self.chat(prompt, system).await?;
            return Ok(single_fragment(text));
        }
        if !status.is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RagError::from_http(SERVICE, e)));
        Ok(decode_generate_stream(body))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        SERVICE
    }
}

struct StreamState<S> {
    body: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> StreamState<S> {
    fn accept_line(&mut self, line: &str) {
        match serde_json::from_str::<GenerateLine>(line) {
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    self.pending.push_back(Err(RagError::UpstreamProtocol(format!(
                        "{}: {}",
                        SERVICE, error
                    ))));
                    self.finished = true;
                    return;
                }
                if let Some(fragment) = parsed.response.filter(|r| !r.is_empty()) {
                    self.pending.push_back(Ok(fragment));
                }
                if parsed.done {
                    self.finished = true;
                }
            }
            Err(e) => {
                self.pending.push_back(Err(RagError::UpstreamProtocol(format!(
                    "{}: undecodable stream line: {}",
                    SERVICE, e
                ))));
                self.finished = true;
            }
        }
    }
}

/// Decode an `/api/generate` NDJSON body into text fragments.
///
/// Fragments are yielded as soon as their line is complete; nothing past the
/// `done` line is read.
pub fn decode_generate_stream<S, B>(body: S) -> TextStream
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = StreamState {
        body: Box::pin(body),
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(chunk.as_ref()) {
                        state.accept_line(&line);
                        if state.finished {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    if let Some(line) = state.decoder.finish() {
                        state.accept_line(&line);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}
