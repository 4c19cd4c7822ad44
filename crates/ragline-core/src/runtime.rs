//! Pipeline construction from configuration and per-request model routing

use crate::config::Config;
use crate::db::Database;
use crate::error::{RagError, Result};
use crate::llm::{CloudGenerator, Generator, OllamaEmbedder, OllamaGenerator};
use crate::pipeline::{
    validate_question, AnswerOptions, PipelineRegistry, ProviderRouter, ProviderSlot, RagPipeline,
};
use crate::types::{PipelineResponse, StreamingAnswer};
use std::sync::Arc;

/// Builds the generation providers for a model name
pub type RouterFactory = Box<dyn Fn(&str) -> Result<ProviderRouter> + Send + Sync>;

/// Wire the primary and secondary generators.
///
/// `model` (or `model.name` from the config) replaces the model of the
/// preferred provider only.
pub fn build_router(config: &Config, model: Option<&str>) -> Result<ProviderRouter> {
    let model = model.or(config.model.name.as_deref());
    let preferred = config.preferred_provider();
    let model_for = |slot: ProviderSlot| if preferred == slot { model } else { None };

    let primary: Option<Arc<dyn Generator>> = if config.cloud.is_configured() {
        Some(Arc::new(CloudGenerator::from_config(
            &config.cloud,
            model_for(ProviderSlot::Primary),
        )?))
    } else {
        tracing::debug!("Cloud provider not configured, primary slot is empty");
        None
    };
    let secondary: Arc<dyn Generator> = Arc::new(OllamaGenerator::from_config(
        &config.ollama,
        model_for(ProviderSlot::Secondary),
    )?);

    Ok(ProviderRouter::new(
        primary,
        Some(secondary),
        config.routing_policy(),
    ))
}

/// Open the index and build a complete pipeline
pub fn build_pipeline(config: &Config, model: Option<&str>) -> Result<RagPipeline> {
    let embedder = Arc::new(OllamaEmbedder::from_config(&config.ollama)?);

    let index_path = config.paths.index_path();
    let db = Database::open(&index_path)?;
    db.initialize()?;
    tracing::debug!("Opened index at {}", index_path.display());

    let router = build_router(config, model)?;
    Ok(RagPipeline::new(
        embedder,
        Arc::new(db),
        router,
        config.retrieval_settings(),
    ))
}

/// Process-wide entry point: the default pipeline plus memoized
/// pipelines for the extra models listed in `model.allowed`
pub struct Runtime {
    config: Config,
    default: Arc<RagPipeline>,
    registry: PipelineRegistry<RagPipeline>,
    router_factory: RouterFactory,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pipeline = build_pipeline(&config, None)?;
        let factory_config = config.clone();
        let factory: RouterFactory =
            Box::new(move |model: &str| build_router(&factory_config, Some(model)));
        Ok(Self::with_parts(config, pipeline, factory))
    }

    /// Assemble from an existing pipeline and router factory
    pub fn with_parts(config: Config, pipeline: RagPipeline, router_factory: RouterFactory) -> Self {
        let registry = PipelineRegistry::new(config.model.cache_capacity);
        Self {
            config,
            default: Arc::new(pipeline),
            registry,
            router_factory,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.default
    }

    /// Models currently memoized, oldest first
    pub fn cached_models(&self) -> Vec<String> {
        self.registry.keys()
    }

    /// Pipeline and options serving a requested model
    pub fn pipeline_for(&self, model: Option<&str>) -> Result<(Arc<RagPipeline>, AnswerOptions)> {
        let Some(name) = model.map(str::trim).filter(|m| !m.is_empty()) else {
            return Ok((Arc::clone(&self.default), AnswerOptions::default()));
        };

        if self.default.router().resolve_model(name).is_ok() {
            return Ok((Arc::clone(&self.default), AnswerOptions::with_model(name)));
        }

        if self.config.model.allowed.iter().any(|m| m == name) {
            let pipeline = self.registry.get_or_try_insert_with(name, || {
                let router = (self.router_factory)(name)?;
                Ok(self.default.with_router(router))
            })?;
            return Ok((pipeline, AnswerOptions::default()));
        }

        Err(RagError::ClientRequest(format!(
            "unknown model '{}'; available: {}{}",
            name,
            self.default.router().describe_models(),
            if self.config.model.allowed.is_empty() {
                String::new()
            } else {
                format!(", {}", self.config.model.allowed.join(", "))
            }
        )))
    }

    pub async fn answer(&self, question: &str, model: Option<&str>) -> Result<PipelineResponse> {
        validate_question(question)?;
        let (pipeline, options) = self.pipeline_for(model)?;
        pipeline.answer_with(question, &options).await
    }

    pub async fn answer_stream(
        &self,
        question: &str,
        model: Option<&str>,
    ) -> Result<StreamingAnswer> {
        validate_question(question)?;
        let (pipeline, options) = self.pipeline_for(model)?;
        pipeline.answer_stream_with(question, &options).await
    }
}
