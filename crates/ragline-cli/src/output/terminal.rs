//! Terminal output formatter

use ragline_core::{PipelineResponse, RetrievalCandidate};

pub fn format_response(response: &PipelineResponse) -> String {
    let mut output = String::new();
    output.push_str(response.answer.trim_end());
    output.push_str("\n\n");
    output.push_str(&format_sources(&response.sources));
    output.push_str(&format_model_line(&response.model, response.used_fallback));
    output
}

pub fn format_sources(sources: &[RetrievalCandidate]) -> String {
    if sources.is_empty() {
        return "Sources: none\n".to_string();
    }

    let mut output = String::from("Sources:\n");
    for source in sources {
        output.push_str(&format!(
            "  - {} (score={:.3})\n",
            source.source_label(),
            source.score
        ));
    }
    output
}

pub fn format_model_line(model: &str, used_fallback: bool) -> String {
    if used_fallback {
        format!("Model: {} (fallback)\n", model)
    } else {
        format!("Model: {}\n", model)
    }
}
