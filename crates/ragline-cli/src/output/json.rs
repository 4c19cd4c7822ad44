//! JSON output formatter

use ragline_core::{PipelineResponse, RetrievalCandidate};

fn sources_json(sources: &[RetrievalCandidate]) -> Vec<serde_json::Value> {
    sources
        .iter()
        .map(|s| {
            serde_json::json!({
                "id": s.id,
                "source": s.source_label(),
                "score": s.score,
                "text": s.text,
                "metadata": s.metadata,
            })
        })
        .collect()
}

pub fn format_response(response: &PipelineResponse) -> String {
    let output = serde_json::json!({
        "answer": response.answer,
        "sources": sources_json(&response.sources),
        "model": response.model,
        "used_fallback": response.used_fallback,
    });
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string()) + "\n"
}

/// One NDJSON line per streamed fragment
pub fn format_fragment(fragment: &str) -> String {
    serde_json::json!({ "fragment": fragment }).to_string() + "\n"
}

/// Closing NDJSON line of a streamed answer
pub fn format_stream_end(sources: &[RetrievalCandidate], model: &str, used_fallback: bool) -> String {
    serde_json::json!({
        "done": true,
        "sources": sources_json(sources),
        "model": model,
        "used_fallback": used_fallback,
    })
    .to_string()
        + "\n"
}
