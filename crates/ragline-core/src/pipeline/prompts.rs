//! Prompt templates

/// Fixed system instruction sent with every generation request
pub const SYSTEM_PROMPT: &str = "You are a bilingual (French/English) assistant. \
Reply in the language the user asked in. \
Rely only on the provided context; when it is empty or does not cover the question, say that you don't know. \
Cite sources briefly (document id or file name) where possible.";

/// Fill the user prompt with the question and assembled context
pub fn render_prompt(question: &str, context: &str) -> String {
    format!(
        "Question:\n{}\n\nContext:\n{}\n\nAnswer in the user's language. Include short source references.",
        question.trim(),
        context
    )
}
