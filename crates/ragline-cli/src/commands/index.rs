//! Index command

use crate::app::{IndexArgs, OutputFormat};
use anyhow::{Context, Result};
use ragline_core::ingest::IndexProgress;
use ragline_core::{index_chunks, read_chunks_jsonl, Config, Database, OllamaEmbedder};

pub async fn run(args: IndexArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let chunks = read_chunks_jsonl(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    let index_path = config.paths.index_path();
    let db = Database::open(&index_path)?;
    db.initialize()?;
    let embedder = OllamaEmbedder::from_config(&config.ollama)?;

    eprintln!(
        "Indexing {} chunks into {} with {}",
        chunks.len(),
        index_path.display(),
        config.ollama.embed_model
    );

    let stats = index_chunks(
        &embedder,
        &db,
        &chunks,
        args.batch_size,
        Some(Box::new(|progress: IndexProgress| {
            eprint!(
                "\rEmbedding: {}/{} chunks   ",
                progress.processed_chunks, progress.total_chunks
            );
        })),
    )
    .await?;

    if stats.batches > 0 {
        eprintln!();
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Cli => {
            println!("Indexed {} chunks", stats.indexed_chunks);
            println!("  Batches: {}", stats.batches);
            if stats.skipped_chunks > 0 {
                println!("  Skipped: {} (empty text)", stats.skipped_chunks);
            }
        }
    }
    Ok(())
}
