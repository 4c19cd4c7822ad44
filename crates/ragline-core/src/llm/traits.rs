//! Collaborator trait definitions

use crate::error::{RagError, Result};
use async_trait::async_trait;
use futures::{stream, Stream};
use std::pin::Pin;

/// Lazy sequence of generated text fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Wrap a complete text as a single-fragment stream
pub fn single_fragment(text: String) -> TextStream {
    Box::pin(stream::once(async move { Ok(text) }))
}

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for batch of texts, one vector per text in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(RagError::UpstreamProtocol(format!(
                "expected 1 embedding, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Text generation trait
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a complete answer
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Generate an answer as incremental fragments.
    ///
    /// Providers without native streaming yield the full `generate` result
    /// as a single fragment.
    async fn stream(&self, prompt: &str, system: Option<&str>) -> Result<TextStream> {
        let text = self.generate(prompt, system).await?;
        Ok(single_fragment(text))
    }

    /// Model identifier reported in responses
    fn model_name(&self) -> &str;

    /// Backend name, e.g. "cloud" or "ollama"
    fn provider_name(&self) -> &str;
}
