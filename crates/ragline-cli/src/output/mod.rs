//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use ragline_core::PipelineResponse;

/// Format a blocking answer
pub fn format_response(response: &PipelineResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::format_response(response),
        OutputFormat::Cli => terminal::format_response(response),
    }
}
