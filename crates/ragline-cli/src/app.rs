//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(
    author,
    version,
    about = "Ask questions over a local vector index with provider fallback"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a question from the indexed chunks
    Ask(AskArgs),

    /// Embed and store pre-chunked JSONL records
    Index(IndexArgs),

    /// Show index status and provider routing
    Status,

    /// Print the effective configuration
    Config,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Index(_) => "index",
            Commands::Status => "status",
            Commands::Config => "config",
        }
    }
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    pub question: Vec<String>,

    /// Model or provider to answer with (primary, secondary, cloud, ollama or a model id)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Number of chunks injected into the prompt
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Minimum similarity score
    #[arg(long)]
    pub min_score: Option<f64>,
}

#[derive(Args)]
pub struct IndexArgs {
    /// JSONL file of {id, text, metadata} records
    pub file: PathBuf,

    /// Chunks per embedding request
    #[arg(long, default_value = "32")]
    pub batch_size: usize,
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    #[default]
    Cli,
    Json,
}
