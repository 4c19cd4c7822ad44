// Ask a question against the configured index using ragline as a library
//
// Usage: cargo run --example ask -- "What is the refund policy?"

use futures::StreamExt;
use ragline_core::{Config, Runtime};
use std::io::Write;

#[tokio::main]
async fn main() -> ragline_core::Result<()> {
    let question = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");

    let config = Config::load()?;
    println!("Index: {}", config.paths.index_path().display());

    let runtime = Runtime::new(config)?;
    let mut answer = runtime.answer_stream(&question, None).await?;

    println!("Model: {} (fallback: {})\n", answer.model, answer.used_fallback);
    let mut stdout = std::io::stdout();
    while let Some(fragment) = answer.fragments.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    println!("\n\nSources:");
    for source in &answer.sources {
        println!("  - {} (score={:.3})", source.source_label(), source.score);
    }

    Ok(())
}
