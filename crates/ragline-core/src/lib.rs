//! Ragline Core Library
//!
//! Retrieval-augmented question answering over a local vector index.
//!
//! # Features
//! - Oversampled nearest-neighbor retrieval with lexical re-ranking
//! - Bounded context assembly with source attribution
//! - Primary/secondary generation providers with one-step fallback
//! - Streaming answers that never mix fragments from two providers
//! - SQLite chunk store with cosine similarity search

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod runtime;
pub mod types;

pub use config::Config;
pub use db::{Database, VectorIndex};
pub use error::{Error, ErrorKind, RagError, Result};
pub use ingest::{index_chunks, read_chunks_jsonl, IndexStats};
pub use llm::{
    CloudGenerator, Embedder, Generator, OllamaEmbedder, OllamaGenerator, TextStream,
};
pub use pipeline::{
    AnswerOptions, PipelineRegistry, ProviderMode, ProviderRouter, ProviderSlot, RagPipeline,
    RetrievalSettings, RoutingPolicy,
};
pub use runtime::{build_pipeline, build_router, Runtime};
pub use types::{Chunk, Metadata, MetadataValue, PipelineResponse, RetrievalCandidate, StreamingAnswer};

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "ragline";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ragline";
