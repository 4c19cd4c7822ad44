//! Config command

use crate::app::OutputFormat;
use anyhow::Result;
use ragline_core::Config;

pub fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let shown = config.redacted();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&shown)?),
        OutputFormat::Cli => print!("{}", serde_yaml::to_string(&shown)?),
    }
    Ok(())
}
