//! Ragline CLI
//!
//! Ask questions over a local vector index.

use clap::Parser;
use ragline_core::error::exit_codes;
use ragline_core::{Config, RagError};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod output;

use app::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::load();
    let level = match (&config, cli.verbose) {
        (_, true) => "debug".to_string(),
        (Ok(config), false) => config.log_level.clone(),
        (Err(_), false) => "warn".to_string(),
    };

    // Logs go to stderr so answers on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            tracing::debug!("Command failed: {:?}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code(&err) as u8)
        }
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    tracing::debug!(
        command = cli.command.name(),
        index = %config.paths.index_path().display(),
        provider = %config.rag.provider,
        "Dispatching"
    );

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, config, cli.format).await,
        Commands::Index(args) => commands::index::run(args, &config, cli.format).await,
        Commands::Status => commands::status::run(&config, cli.format).await,
        Commands::Config => commands::config::run(&config, cli.format),
    }
}

/// Exit code of the first `RagError` in the chain
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RagError>())
        .map(RagError::exit_code)
        .unwrap_or(exit_codes::GENERAL_ERROR)
}
