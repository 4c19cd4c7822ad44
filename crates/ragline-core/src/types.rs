//! Request-scoped data model shared by the pipeline stages

use crate::llm::TextStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar metadata value attached to a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Chunk metadata, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata key holding the human-readable source label
pub const SOURCE_KEY: &str = "source";

fn resolve_label<'a>(metadata: &'a Metadata, id: &'a str) -> String {
    match metadata.get(SOURCE_KEY) {
        Some(value) => {
            let label = value.to_string();
            if label.trim().is_empty() {
                id.to_string()
            } else {
                label
            }
        }
        None => id.to_string(),
    }
}

/// A slice of an ingested document as stored in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Source label, falling back to the chunk id
    pub fn source_label(&self) -> String {
        resolve_label(&self.metadata, &self.id)
    }
}

/// A chunk returned by a nearest-neighbor query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub id: String,
    pub text: String,
    /// Vector similarity, higher is more relevant
    pub score: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RetrievalCandidate {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Source label, falling back to the candidate id
    pub fn source_label(&self) -> String {
        resolve_label(&self.metadata, &self.id)
    }

    /// Build a candidate from a stored chunk and its similarity
    pub fn from_chunk(chunk: Chunk, score: f64) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            score,
            metadata: chunk.metadata,
        }
    }
}

/// Answer produced by a blocking pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub answer: String,
    /// Candidates injected into the prompt, in context order
    pub sources: Vec<RetrievalCandidate>,
    /// Model identifier of the provider that produced the answer
    pub model: String,
    pub used_fallback: bool,
}

/// Answer produced by a streaming pipeline invocation
pub struct StreamingAnswer {
    pub sources: Vec<RetrievalCandidate>,
    pub model: String,
    pub used_fallback: bool,
    /// Lazy answer fragments from the winning provider
    pub fragments: TextStream,
}

impl fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("sources", &self.sources)
            .field("model", &self.model)
            .field("used_fallback", &self.used_fallback)
            .finish_non_exhaustive()
    }
}
