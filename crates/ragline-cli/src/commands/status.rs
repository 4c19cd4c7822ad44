//! Status command

use crate::app::OutputFormat;
use anyhow::Result;
use ragline_core::{build_router, Config, Database, ProviderSlot};
use serde::Serialize;

#[derive(Serialize)]
struct ProviderStatus {
    slot: ProviderSlot,
    provider: String,
    model: String,
}

#[derive(Serialize)]
struct Status {
    index_path: String,
    chunk_count: usize,
    dimensions: Option<usize>,
    last_indexed_at: Option<String>,
    embed_model: String,
    providers: Vec<ProviderStatus>,
    default_provider: Option<ProviderSlot>,
    mode: String,
    fallback_enabled: bool,
    allowed_models: Vec<String>,
}

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let index_path = config.paths.index_path();
    let db = Database::open(&index_path)?;
    db.initialize()?;
    let info = db.index_info()?;

    let router = build_router(config, None)?;
    let providers = [ProviderSlot::Primary, ProviderSlot::Secondary]
        .into_iter()
        .filter_map(|slot| {
            router.provider(slot).map(|g| ProviderStatus {
                slot,
                provider: g.provider_name().to_string(),
                model: g.model_name().to_string(),
            })
        })
        .collect();

    let status = Status {
        index_path: index_path.display().to_string(),
        chunk_count: info.chunk_count,
        dimensions: info.dimensions,
        last_indexed_at: info.last_indexed_at,
        embed_model: config.ollama.embed_model.clone(),
        providers,
        default_provider: router.default_slot().ok(),
        mode: router.policy().mode.to_string(),
        fallback_enabled: router.policy().fallback_enabled,
        allowed_models: config.model.allowed.clone(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Cli => {
            println!("Index:           {}", status.index_path);
            println!("Chunks:          {}", status.chunk_count);
            if let Some(dims) = status.dimensions {
                println!("Dimensions:      {}", dims);
            }
            if let Some(ref last) = status.last_indexed_at {
                println!("Last indexed:    {}", last);
            }
            println!("Embed model:     {}", status.embed_model);
            println!();
            println!("Providers:");
            if router.provider(ProviderSlot::Primary).is_none() {
                println!("  primary:       not configured");
            }
            for p in &status.providers {
                println!("  {:<14} {} ({})", format!("{}:", p.slot), p.provider, p.model);
            }
            println!();
            println!("Routing:");
            println!("  Mode:          {}", status.mode);
            match status.default_provider {
                Some(slot) => println!("  Default:       {}", slot),
                None => println!("  Default:       none"),
            }
            println!("  Fallback:      {}", status.fallback_enabled);
            if !status.allowed_models.is_empty() {
                println!("  Extra models:  {}", status.allowed_models.join(", "));
            }
        }
    }
    Ok(())
}
