//! Database layer for ragline
//!
//! SQLite-backed chunk store with brute-force cosine similarity search.

mod schema;
pub mod vectors;

pub use schema::Database;
pub use vectors::IndexInfo;

use crate::error::Result;
use crate::types::{Chunk, RetrievalCandidate};
use async_trait::async_trait;
use std::path::PathBuf;

/// Nearest-neighbor lookup over stored chunks
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` candidates, best first. Each carries a similarity score.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>>;

    /// Store chunks with their embeddings, replacing existing ids
    async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Number of stored chunks
    async fn count(&self) -> Result<usize>;
}

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CACHE_DIR_NAME)
            .join("index.sqlite")
    }
}
