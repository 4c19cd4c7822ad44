//! Context block assembly

use crate::types::RetrievalCandidate;

/// Marker appended to truncated snippets
pub const ELLIPSIS: &str = "...";

/// Separator between context entries
const ENTRY_SEPARATOR: &str = "\n\n";

/// Trim and cap a snippet at `max_chars` characters, appending the ellipsis when cut
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &trimmed[..byte_idx], ELLIPSIS),
        None => trimmed.to_string(),
    }
}

/// Render candidates as `[label] text` entries separated by a blank line
pub fn build_context(candidates: &[RetrievalCandidate], max_snippet_chars: usize) -> String {
    candidates
        .iter()
        .map(|c| {
            format!(
                "[{}] {}",
                c.source_label(),
                truncate_snippet(&c.text, max_snippet_chars)
            )
        })
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}
