//! End-to-end pipeline behavior with in-process collaborators
//!
//! Covers:
//! 1. Filtering, re-ranking and context assembly reaching the provider
//! 2. Blocking fallback accounting
//! 3. Streaming fallback before the first fragment
//! 4. Client errors raised before any collaborator call

use async_trait::async_trait;
use futures::{stream, TryStreamExt};
use ragline_core::llm::TextStream;
use ragline_core::pipeline::SYSTEM_PROMPT;
use ragline_core::{
    AnswerOptions, Chunk, Embedder, Generator, ProviderRouter, ProviderSlot, RagError,
    RagPipeline, Result, RetrievalCandidate, RetrievalSettings, RoutingPolicy, VectorIndex,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FixedEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Returns a canned candidate list and records the requested k
struct CannedIndex {
    candidates: Vec<RetrievalCandidate>,
    requested_k: Mutex<Vec<usize>>,
}

#[async_trait]
impl VectorIndex for CannedIndex {
    async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<RetrievalCandidate>> {
        self.requested_k.lock().unwrap().push(k);
        Ok(self.candidates.iter().take(k).cloned().collect())
    }

    async fn add(&self, _chunks: &[Chunk], _vectors: &[Vec<f32>]) -> Result<()> {
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.candidates.len())
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    FailCall,
    /// stream() opens but the first item is an error
    FailFirstFragment,
    /// Two fragments then a mid-stream error
    FailMidStream,
}

struct MockGenerator {
    model: &'static str,
    provider: &'static str,
    behavior: Behavior,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, Option<String>)>>,
}

impl MockGenerator {
    fn new(model: &'static str, provider: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            model,
            provider,
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, prompt: &str, system: Option<&str>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), system.map(str::to_string)));
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().unwrap().0.clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        self.record(prompt, system);
        match self.behavior {
            Behavior::Succeed => Ok(format!("{} says hi", self.model)),
            _ => Err(RagError::Unavailable(format!("{} unreachable", self.provider))),
        }
    }

    async fn stream(&self, prompt: &str, system: Option<&str>) -> Result<TextStream> {
        self.record(prompt, system);
        let model = self.model;
        let items: Vec<Result<String>> = match self.behavior {
            Behavior::Succeed => vec![Ok(format!("{}-1 ", model)), Ok(format!("{}-2", model))],
            Behavior::FailCall => {
                return Err(RagError::Timeout(format!("{} timed out", self.provider)))
            }
            Behavior::FailFirstFragment => {
                vec![Err(RagError::UpstreamProtocol("bad first line".to_string()))]
            }
            Behavior::FailMidStream => vec![
                Ok(format!("{}-1 ", model)),
                Ok(format!("{}-2", model)),
                Err(RagError::UpstreamProtocol("connection reset".to_string())),
            ],
        };
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        self.model
    }

    fn provider_name(&self) -> &str {
        self.provider
    }
}

struct Harness {
    embedder: Arc<FixedEmbedder>,
    index: Arc<CannedIndex>,
    primary: Arc<MockGenerator>,
    secondary: Arc<MockGenerator>,
    pipeline: RagPipeline,
}

fn refund_candidates() -> Vec<RetrievalCandidate> {
    vec![
        RetrievalCandidate::new("a", "refund in 30 days", 0.9),
        RetrievalCandidate::new("b", "shipping is free", 0.4),
    ]
}

fn harness(
    candidates: Vec<RetrievalCandidate>,
    primary: Behavior,
    secondary: Behavior,
    fallback_enabled: bool,
    settings: RetrievalSettings,
) -> Harness {
    let embedder = Arc::new(FixedEmbedder {
        calls: AtomicUsize::new(0),
    });
    let index = Arc::new(CannedIndex {
        candidates,
        requested_k: Mutex::new(Vec::new()),
    });
    let primary = MockGenerator::new("best-model", "cloud", primary);
    let secondary = MockGenerator::new("llama3", "ollama", secondary);
    let router = ProviderRouter::new(
        Some(primary.clone() as Arc<dyn Generator>),
        Some(secondary.clone() as Arc<dyn Generator>),
        RoutingPolicy {
            fallback_enabled,
            ..RoutingPolicy::default()
        },
    );
    let pipeline = RagPipeline::new(
        embedder.clone() as Arc<dyn Embedder>,
        index.clone() as Arc<dyn VectorIndex>,
        router,
        settings,
    );
    Harness {
        embedder,
        index,
        primary,
        secondary,
        pipeline,
    }
}

fn refund_settings() -> RetrievalSettings {
    RetrievalSettings {
        top_k: 2,
        min_score: 0.5,
        oversample: 3,
        max_snippet_chars: 800,
    }
}

#[tokio::test]
async fn test_refund_scenario_filters_and_builds_context() {
    let h = harness(
        refund_candidates(),
        Behavior::Succeed,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let response = h.pipeline.answer("What is the refund policy?").await.unwrap();

    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].id, "a");
    assert_eq!(response.model, "best-model");
    assert!(!response.used_fallback);
    assert_eq!(response.answer, "best-model says hi");

    let prompt = h.primary.last_prompt();
    assert!(prompt.contains("Context:\n[a] refund in 30 days\n\n"));
    assert!(!prompt.contains("shipping"));
    let system = h.primary.prompts.lock().unwrap()[0].1.clone();
    assert_eq!(system.as_deref(), Some(SYSTEM_PROMPT));

    // top_k * oversample
    assert_eq!(*h.index.requested_k.lock().unwrap(), vec![6]);
}

#[tokio::test]
async fn test_empty_candidates_still_call_provider() {
    let h = harness(
        Vec::new(),
        Behavior::Succeed,
        Behavior::Succeed,
        true,
        RetrievalSettings::default(),
    );

    let response = h.pipeline.answer("Anything about refunds?").await.unwrap();

    assert!(response.sources.is_empty());
    assert_eq!(h.primary.calls(), 1);
    assert!(h.primary.last_prompt().contains("Context:\n\n\n"));
}

#[tokio::test]
async fn test_blocking_fallback_calls_each_provider_once() {
    let h = harness(
        refund_candidates(),
        Behavior::FailCall,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let response = h.pipeline.answer("refund?").await.unwrap();

    assert!(response.used_fallback);
    assert_eq!(response.model, "llama3");
    assert_eq!(h.primary.calls(), 1);
    assert_eq!(h.secondary.calls(), 1);
    assert_eq!(h.primary.last_prompt(), h.secondary.last_prompt());
}

#[tokio::test]
async fn test_fallback_disabled_propagates_error_kind() {
    let h = harness(
        refund_candidates(),
        Behavior::FailCall,
        Behavior::Succeed,
        false,
        refund_settings(),
    );

    let err = h.pipeline.answer("refund?").await.unwrap_err();

    assert!(matches!(err, RagError::Unavailable(_)));
    assert_eq!(h.secondary.calls(), 0);
}

#[tokio::test]
async fn test_stream_falls_back_on_first_fragment_error() {
    let h = harness(
        refund_candidates(),
        Behavior::FailFirstFragment,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let answer = h.pipeline.answer_stream("refund?").await.unwrap();
    assert!(answer.used_fallback);
    assert_eq!(answer.model, "llama3");
    assert_eq!(answer.sources.len(), 1);

    let fragments: Vec<String> = answer.fragments.try_collect().await.unwrap();
    assert_eq!(fragments, vec!["llama3-1 ".to_string(), "llama3-2".to_string()]);
    assert!(fragments.iter().all(|f| !f.contains("best-model")));
}

#[tokio::test]
async fn test_stream_falls_back_when_open_fails() {
    let h = harness(
        refund_candidates(),
        Behavior::FailCall,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let answer = h.pipeline.answer_stream("refund?").await.unwrap();
    assert!(answer.used_fallback);
    assert_eq!(h.primary.calls(), 1);
    assert_eq!(h.secondary.calls(), 1);
}

#[tokio::test]
async fn test_stream_mid_failure_is_not_fallback() {
    let h = harness(
        refund_candidates(),
        Behavior::FailMidStream,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let mut answer = h.pipeline.answer_stream("refund?").await.unwrap();
    assert!(!answer.used_fallback);
    assert_eq!(answer.model, "best-model");

    let mut seen = Vec::new();
    let err = loop {
        match answer.fragments.try_next().await {
            Ok(Some(fragment)) => seen.push(fragment),
            Ok(None) => panic!("stream ended without the scripted error"),
            Err(e) => break e,
        }
    };
    assert_eq!(seen, vec!["best-model-1 ".to_string(), "best-model-2".to_string()]);
    assert!(matches!(err, RagError::UpstreamProtocol(_)));
    assert_eq!(h.secondary.calls(), 0);
}

#[tokio::test]
async fn test_stream_both_fail_propagates() {
    let h = harness(
        refund_candidates(),
        Behavior::FailFirstFragment,
        Behavior::FailCall,
        true,
        refund_settings(),
    );

    let err = h.pipeline.answer_stream("refund?").await.unwrap_err();
    assert!(matches!(err, RagError::Timeout(_)));
}

#[tokio::test]
async fn test_client_errors_before_any_call() {
    let h = harness(
        refund_candidates(),
        Behavior::Succeed,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let err = h.pipeline.answer("   ").await.unwrap_err();
    assert!(matches!(err, RagError::ClientRequest(_)));

    let err = h
        .pipeline
        .answer_with("refund?", &AnswerOptions::with_model("gpt-unknown"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ClientRequest(_)));

    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(h.index.requested_k.lock().unwrap().is_empty());
    assert_eq!(h.primary.calls() + h.secondary.calls(), 0);
}

#[tokio::test]
async fn test_model_override_selects_secondary() {
    let h = harness(
        refund_candidates(),
        Behavior::Succeed,
        Behavior::Succeed,
        true,
        refund_settings(),
    );

    let response = h
        .pipeline
        .answer_with("refund?", &AnswerOptions::with_model("llama3"))
        .await
        .unwrap();

    assert_eq!(response.model, "llama3");
    assert!(!response.used_fallback);
    assert_eq!(h.primary.calls(), 0);
    assert_eq!(
        h.pipeline.router().resolve_model("primary").unwrap(),
        ProviderSlot::Primary
    );
}

#[tokio::test]
async fn test_retrieval_errors_propagate() {
    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<RetrievalCandidate>> {
            Err(RagError::Unavailable("index offline".to_string()))
        }

        async fn add(&self, _chunks: &[Chunk], _vectors: &[Vec<f32>]) -> Result<()> {
            Ok(())
        }

        async fn count(&self) -> Result<usize> {
            Ok(0)
        }
    }

    let h = harness(
        Vec::new(),
        Behavior::Succeed,
        Behavior::Succeed,
        true,
        RetrievalSettings::default(),
    );
    let broken = RagPipeline::new(
        h.embedder.clone() as Arc<dyn Embedder>,
        Arc::new(BrokenIndex),
        h.pipeline.router().clone(),
        RetrievalSettings::default(),
    );

    let err = broken.answer("refund?").await.unwrap_err();
    assert!(matches!(err, RagError::Unavailable(_)));
    assert_eq!(h.primary.calls(), 0);
}
