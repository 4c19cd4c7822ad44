//! Relevance filtering and lexical re-ranking of retrieval candidates

use crate::types::RetrievalCandidate;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// Shortest token counted as a query term
const MIN_TERM_CHARS: usize = 3;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[\p{L}\p{N}]+").unwrap();
}

/// Distinct lowercase alphanumeric tokens of at least three characters
pub fn query_terms(question: &str) -> BTreeSet<String> {
    let lowered = question.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_string)
        .collect()
}

/// Drop candidates scoring below `min_score`. A floor of 0 or less keeps everything.
pub fn filter_by_min_score(
    candidates: Vec<RetrievalCandidate>,
    min_score: f64,
) -> Vec<RetrievalCandidate> {
    if min_score <= 0.0 {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| c.score >= min_score)
        .collect()
}

/// Number of distinct terms found in the candidate's label or text
pub fn lexical_overlap(terms: &BTreeSet<String>, candidate: &RetrievalCandidate) -> usize {
    // Space keeps a term from matching across the label/text boundary
    let haystack = format!(
        "{} {}",
        candidate.source_label().to_lowercase(),
        candidate.text.to_lowercase()
    );
    terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count()
}

/// Filter, re-order by (overlap, score) and keep the best `top_k`
pub fn rerank(
    question: &str,
    candidates: Vec<RetrievalCandidate>,
    top_k: usize,
    min_score: f64,
) -> Vec<RetrievalCandidate> {
    let mut kept = filter_by_min_score(candidates, min_score);
    let terms = query_terms(question);

    if !terms.is_empty() && kept.len() > 1 {
        let mut keyed: Vec<(usize, RetrievalCandidate)> = kept
            .into_iter()
            .map(|c| (lexical_overlap(&terms, &c), c))
            .collect();
        // sort_by is stable, so equal keys keep retrieval order
        keyed.sort_by(|(overlap_a, a), (overlap_b, b)| {
            overlap_b
                .cmp(overlap_a)
                .then_with(|| b.score.total_cmp(&a.score))
        });
        kept = keyed.into_iter().map(|(_, c)| c).collect();
    }

    kept.truncate(top_k);
    kept
}
