//! Write path: embed pre-chunked records and store them in the index

use crate::db::VectorIndex;
use crate::error::{RagError, Result};
use crate::llm::Embedder;
use crate::types::Chunk;
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;

/// Default number of chunks per embedding request
pub const BATCH_SIZE: usize = 32;

/// Indexing progress
#[derive(Debug, Clone)]
pub struct IndexProgress {
    pub total_chunks: usize,
    pub processed_chunks: usize,
}

/// Indexing statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub indexed_chunks: usize,
    /// Chunks with blank text, never sent to the embedder
    pub skipped_chunks: usize,
    pub batches: usize,
}

/// Embed chunks in batches and add them to the index
pub async fn index_chunks(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    chunks: &[Chunk],
    batch_size: usize,
    progress: Option<Box<dyn Fn(IndexProgress) + Send + Sync>>,
) -> Result<IndexStats> {
    let batch_size = batch_size.max(1);
    let (usable, skipped): (Vec<&Chunk>, Vec<&Chunk>) =
        chunks.iter().partition(|c| !c.text.trim().is_empty());

    let mut stats = IndexStats {
        total_chunks: chunks.len(),
        skipped_chunks: skipped.len(),
        ..IndexStats::default()
    };
    for chunk in &skipped {
        tracing::warn!("Skipping chunk {} with empty text", chunk.id);
    }

    for batch in usable.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RagError::UpstreamProtocol(format!(
                "embedder returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }

        let owned: Vec<Chunk> = batch.iter().map(|c| (*c).clone()).collect();
        index.add(&owned, &vectors).await?;

        stats.indexed_chunks += batch.len();
        stats.batches += 1;

        if let Some(ref cb) = progress {
            cb(IndexProgress {
                total_chunks: usable.len(),
                processed_chunks: stats.indexed_chunks,
            });
        }
    }

    tracing::info!(
        "Indexed {} chunks in {} batches with {}",
        stats.indexed_chunks,
        stats.batches,
        embedder.model_name()
    );
    Ok(stats)
}

/// Read `{id, text, metadata}` records, one JSON object per line
pub fn read_chunks_jsonl(path: &Path) -> Result<Vec<Chunk>> {
    let file = std::fs::File::open(path)?;
    parse_chunks_jsonl(std::io::BufReader::new(file))
}

pub fn parse_chunks_jsonl<R: BufRead>(reader: R) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line)
            .map_err(|e| RagError::InvalidInput(format!("line {}: {}", idx + 1, e)))?;
        if chunk.id.trim().is_empty() {
            return Err(RagError::InvalidInput(format!(
                "line {}: chunk id is empty",
                idx + 1
            )));
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}
