//! LLM integration
//!
//! Provides traits and implementations for:
//! - Embedding generation via Ollama or OpenAI-compatible services
//! - Text generation via a cloud endpoint (primary) and Ollama (secondary)
//! - Incremental NDJSON streaming of generated text

mod client;
mod cloud;
mod ndjson;
mod ollama;
mod traits;

pub use client::{
    build_messages, chat_completion, http_client, streaming_http_client, ChatMessage,
};
pub use cloud::CloudGenerator;
pub use ndjson::NdjsonDecoder;
pub use ollama::{decode_generate_stream, parse_vectors, OllamaEmbedder, OllamaGenerator};
pub use traits::*;
