//! Ingest into a file-backed SQLite index and query it through the pipeline

use async_trait::async_trait;
use ragline_core::{
    index_chunks, Chunk, Database, Embedder, Generator, ProviderRouter, RagPipeline, Result,
    RetrievalSettings, RoutingPolicy, VectorIndex,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Bag-of-keywords embedding over a tiny fixed vocabulary
struct KeywordEmbedder;

const VOCAB: &[&str] = &["refund", "shipping", "warranty"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB
                    .iter()
                    .map(|w| if lower.contains(w) { 1.0 } else { 0.01 })
                    .collect()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keywords"
    }
}

struct Echo;

#[async_trait]
impl Generator for Echo {
    async fn generate(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(prompt.to_string())
    }

    fn model_name(&self) -> &str {
        "echo"
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}

#[tokio::test]
async fn test_index_then_answer() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(dir.path().join("index.sqlite")).unwrap());
    db.initialize().unwrap();

    let chunks = vec![
        Chunk::new("faq#1", "Refunds are issued within 30 days.").with_metadata("source", "faq.md"),
        Chunk::new("faq#2", "Shipping is free above 50 EUR.").with_metadata("source", "faq.md"),
        Chunk::new("terms#1", "The warranty lasts two years.").with_metadata("source", "terms.pdf"),
    ];
    let stats = index_chunks(&KeywordEmbedder, db.as_ref(), &chunks, 2, None)
        .await
        .unwrap();
    assert_eq!(stats.indexed_chunks, 3);
    assert_eq!(db.count().await.unwrap(), 3);

    let router = ProviderRouter::new(
        None,
        Some(Arc::new(Echo) as Arc<dyn Generator>),
        RoutingPolicy::default(),
    );
    let pipeline = RagPipeline::new(
        Arc::new(KeywordEmbedder),
        db.clone() as Arc<dyn VectorIndex>,
        router,
        RetrievalSettings {
            top_k: 1,
            ..RetrievalSettings::default()
        },
    );

    let response = pipeline.answer("How do refunds work?").await.unwrap();
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].id, "faq#1");
    assert!(response
        .answer
        .contains("[faq.md] Refunds are issued within 30 days."));
    assert_eq!(response.model, "echo");
}

#[tokio::test]
async fn test_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.sqlite");
    {
        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        index_chunks(
            &KeywordEmbedder,
            &db,
            &[Chunk::new("a", "refund")],
            32,
            None,
        )
        .await
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    db.initialize().unwrap();
    let info = db.index_info().unwrap();
    assert_eq!(info.chunk_count, 1);
    assert_eq!(info.dimensions, Some(VOCAB.len()));
    assert!(info.last_indexed_at.is_some());
}
