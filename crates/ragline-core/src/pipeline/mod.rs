//! RAG query pipeline
//!
//! question -> embed -> oversampled vector query -> filter and re-rank ->
//! context block -> prompt -> provider router -> answer with sources.

mod context;
mod prompts;
mod registry;
mod rerank;
mod router;

pub use context::{build_context, truncate_snippet, ELLIPSIS};
pub use prompts::{render_prompt, SYSTEM_PROMPT};
pub use registry::PipelineRegistry;
pub use rerank::{filter_by_min_score, lexical_overlap, query_terms, rerank};
pub use router::{
    select_provider, Generation, ProviderMode, ProviderRouter, ProviderSlot, RoutingPolicy,
    StreamingGeneration,
};

use crate::db::VectorIndex;
use crate::error::{RagError, Result};
use crate::llm::Embedder;
use crate::types::{PipelineResponse, RetrievalCandidate, StreamingAnswer};
use std::sync::Arc;

/// Retrieval knobs of one pipeline instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Score floor, 0 disables filtering
    pub min_score: f64,
    /// Multiplier on top_k for the nearest-neighbor pull
    pub oversample: usize,
    pub max_snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.0,
            oversample: 3,
            max_snippet_chars: 800,
        }
    }
}

impl RetrievalSettings {
    /// Number of candidates requested from the index
    pub fn pull_size(&self) -> usize {
        self.top_k.max(1).saturating_mul(self.oversample.max(1))
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    /// Model name mapped onto one of the configured providers
    pub model: Option<String>,
}

impl AnswerOptions {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
        }
    }
}

/// Reject blank questions before any collaborator is called
pub fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::ClientRequest("question is empty".to_string()));
    }
    Ok(trimmed)
}

/// Prompt and sources ready for generation
struct Prepared {
    sources: Vec<RetrievalCandidate>,
    prompt: String,
}

/// Retrieval-augmented answering over one embedder, index and router
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    router: ProviderRouter,
    settings: RetrievalSettings,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        router: ProviderRouter,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            router,
            settings,
        }
    }

    /// Same retrieval collaborators, different generation providers
    pub fn with_router(&self, router: ProviderRouter) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
            router,
            settings: self.settings,
        }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Embed the question, pull an oversampled candidate set and re-rank it
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievalCandidate>> {
        let question = validate_question(question)?;
        let vector = self.embedder.embed(question).await?;

        let pull = self.settings.pull_size();
        let candidates = self.index.query(&vector, pull).await?;
        let pulled = candidates.len();

        let ranked = rerank(
            question,
            candidates,
            self.settings.top_k,
            self.settings.min_score,
        );
        tracing::debug!(
            "Retrieved {} of {} requested candidates, kept {}",
            pulled,
            pull,
            ranked.len()
        );
        Ok(ranked)
    }

    pub async fn answer(&self, question: &str) -> Result<PipelineResponse> {
        self.answer_with(question, &AnswerOptions::default()).await
    }

    pub async fn answer_with(
        &self,
        question: &str,
        options: &AnswerOptions,
    ) -> Result<PipelineResponse> {
        let override_slot = self.check_request(question, options)?;
        let prepared = self.prepare(question).await?;

        let generation = self
            .router
            .generate(&prepared.prompt, Some(SYSTEM_PROMPT), override_slot)
            .await?;

        tracing::info!(
            "Answered with {} ({} sources, fallback={})",
            generation.model,
            prepared.sources.len(),
            generation.used_fallback
        );
        Ok(PipelineResponse {
            answer: generation.text,
            sources: prepared.sources,
            model: generation.model,
            used_fallback: generation.used_fallback,
        })
    }

    pub async fn answer_stream(&self, question: &str) -> Result<StreamingAnswer> {
        self.answer_stream_with(question, &AnswerOptions::default())
            .await
    }

    /// Streaming answer. Provider failures before the first fragment fall
    /// back; the returned fragments come from a single provider.
    pub async fn answer_stream_with(
        &self,
        question: &str,
        options: &AnswerOptions,
    ) -> Result<StreamingAnswer> {
        let override_slot = self.check_request(question, options)?;
        let prepared = self.prepare(question).await?;

        let generation = self
            .router
            .stream(&prepared.prompt, Some(SYSTEM_PROMPT), override_slot)
            .await?;

        tracing::info!(
            "Streaming with {} ({} sources, fallback={})",
            generation.model,
            prepared.sources.len(),
            generation.used_fallback
        );
        Ok(StreamingAnswer {
            sources: prepared.sources,
            model: generation.model,
            used_fallback: generation.used_fallback,
            fragments: generation.fragments,
        })
    }

    /// Client-side checks that must pass before any network work
    fn check_request(
        &self,
        question: &str,
        options: &AnswerOptions,
    ) -> Result<Option<ProviderSlot>> {
        validate_question(question)?;
        let slot = match options.model.as_deref() {
            Some(name) => Some(self.router.resolve_model(name)?),
            None => None,
        };
        // Surface configuration errors before retrieval as well
        select_provider(
            slot,
            self.router.policy(),
            self.router.available(ProviderSlot::Primary),
            self.router.available(ProviderSlot::Secondary),
        )?;
        Ok(slot)
    }

    async fn prepare(&self, question: &str) -> Result<Prepared> {
        let sources = self.retrieve(question).await?;
        let context = build_context(&sources, self.settings.max_snippet_chars);
        let prompt = render_prompt(question, &context);
        Ok(Prepared { sources, prompt })
    }
}
