//! Vector storage operations
//!
//! Stores embeddings as BLOBs and computes cosine similarity in Rust.

use super::{Database, VectorIndex};
use crate::error::{RagError, Result};
use crate::types::{Chunk, Metadata, RetrievalCandidate};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Summary of what the index holds
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexInfo {
    pub chunk_count: usize,
    pub dimensions: Option<usize>,
    pub last_indexed_at: Option<String>,
}

impl Database {
    /// Dimensions of stored embeddings, if any are stored
    pub fn stored_dimensions(&self) -> Result<Option<usize>> {
        let conn = self.conn()?;
        let dims: Option<i64> = conn
            .query_row("SELECT dimensions FROM chunks LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    /// Chunk count, dimensions and last write time
    pub fn index_info(&self) -> Result<IndexInfo> {
        let conn = self.conn()?;
        let (count, last): (i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MAX(created_at) FROM chunks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        drop(conn);

        Ok(IndexInfo {
            chunk_count: count as usize,
            dimensions: self.stored_dimensions()?,
            last_indexed_at: last,
        })
    }

    /// Upsert chunks with their embeddings in one transaction
    pub fn insert_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(RagError::InvalidInput(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dimensions = first.len();
        if dimensions == 0 {
            return Err(RagError::InvalidInput("empty embedding vector".to_string()));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimensions) {
            return Err(RagError::InvalidInput(format!(
                "vector for chunk {} has {} dimensions, expected {}",
                chunks[bad].id,
                vectors[bad].len(),
                dimensions
            )));
        }
        if let Some(stored) = self.stored_dimensions()? {
            if stored != dimensions {
                return Err(RagError::InvalidInput(format!(
                    "index holds {}-dimensional embeddings, got {}",
                    stored, dimensions
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO chunks (id, text, metadata, embedding, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (chunk, vector) in chunks.iter().zip(vectors) {
                let metadata = serde_json::to_string(&chunk.metadata)?;
                stmt.execute(params![
                    chunk.id,
                    chunk.text,
                    metadata,
                    embedding_to_bytes(vector),
                    dimensions as i64,
                    now
                ])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Stored {} chunks ({} dims)", chunks.len(), dimensions);
        Ok(())
    }

    /// Brute-force nearest neighbors by cosine similarity, best first
    pub fn search_vectors(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if let Some(stored) = self.stored_dimensions()? {
            if stored != query.len() {
                return Err(RagError::Config(format!(
                    "query embedding has {} dimensions but the index holds {}; \
                     was the index built with a different embedding model?",
                    query.len(),
                    stored
                )));
            }
        }

        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, text, metadata, embedding FROM chunks ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let text: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let embedding: Vec<u8> = row.get(3)?;
                Ok((id, text, metadata, embedding))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, text, metadata, embedding) in rows {
            let metadata: Metadata = serde_json::from_str(&metadata)?;
            let score = cosine_similarity(query, &bytes_to_embedding(&embedding)) as f64;
            scored.push(RetrievalCandidate {
                id,
                text,
                score,
                metadata,
            });
        }

        // Stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorIndex for Database {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        let db = self.clone();
        let query = vector.to_vec();
        run_blocking(move || db.search_vectors(&query, k)).await
    }

    async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        let db = self.clone();
        let chunks = chunks.to_vec();
        let vectors = vectors.to_vec();
        run_blocking(move || db.insert_chunks(&chunks, &vectors)).await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.index_info()?.chunk_count)
    }
}

/// Run SQLite work on the blocking pool instead of a runtime worker
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::Other(anyhow::anyhow!("database task failed: {}", e)))?
}

/// Convert f32 embedding to bytes
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert bytes to f32 embedding
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embeddings
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
