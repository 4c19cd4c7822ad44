//! Configuration management
//!
//! Settings are read from a YAML file and then overridden by flat
//! `RAGLINE_*` environment variables. Everything has a usable default so a
//! local Ollama install works without any file at all.

use crate::error::{RagError, Result};
use crate::pipeline::{ProviderMode, ProviderSlot, RetrievalSettings, RoutingPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "RAGLINE_CONFIG";

/// Placeholder API key shipped in sample configs
const PLACEHOLDER_API_KEY: &str = "replace-me";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_env")]
    pub app_env: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Local Ollama service: embeddings and the secondary generator
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Cloud completion service: the primary generator
    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_env: default_app_env(),
            log_level: default_log_level(),
            paths: PathsConfig::default(),
            ollama: OllamaConfig::default(),
            cloud: CloudConfig::default(),
            rag: RagConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

fn default_app_env() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Vector index file (defaults to `<data_dir>/index.sqlite`)
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_path: None,
        }
    }
}

impl PathsConfig {
    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("index.sqlite"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::CACHE_DIR_NAME)
}

/// Ollama service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            embed_model: default_embed_model(),
            llm_model: default_llm_model(),
            timeout_secs: default_ollama_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_llm_model() -> String {
    "llama3".to_string()
}

fn default_ollama_timeout() -> u64 {
    120
}

/// Cloud completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Free-form provider label, used in logs and model matching
    #[serde(default = "default_cloud_provider")]
    pub provider: String,

    #[serde(default)]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_cloud_model")]
    pub model: String,

    #[serde(default = "default_cloud_timeout")]
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            provider: default_cloud_provider(),
            api_url: String::new(),
            api_key: None,
            model: default_cloud_model(),
            timeout_secs: default_cloud_timeout(),
        }
    }
}

impl CloudConfig {
    /// Cloud generation is only wired when an endpoint and a real key exist
    pub fn is_configured(&self) -> bool {
        let has_key = self
            .api_key
            .as_deref()
            .map(|k| !k.trim().is_empty() && k != PLACEHOLDER_API_KEY)
            .unwrap_or(false);
        has_key && !self.api_url.trim().is_empty()
    }
}

fn default_cloud_provider() -> String {
    "generic".to_string()
}

fn default_cloud_model() -> String {
    "best-model".to_string()
}

fn default_cloud_timeout() -> u64 {
    30
}

/// Retrieval and routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Score floor, 0 disables filtering
    #[serde(default)]
    pub min_score: f64,

    /// Multiplier on top_k for the initial nearest-neighbor pull
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,

    #[serde(default)]
    pub provider: ProviderMode,

    /// Preference consulted by `auto` mode
    #[serde(default = "default_true", alias = "use_cloud_first")]
    pub prefer_primary: bool,

    #[serde(default = "default_true", alias = "fallback_to_ollama")]
    pub fallback_enabled: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            oversample: default_oversample(),
            max_snippet_chars: default_max_snippet_chars(),
            provider: ProviderMode::default(),
            prefer_primary: true,
            fallback_enabled: true,
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_oversample() -> usize {
    3
}

fn default_max_snippet_chars() -> usize {
    1200
}

fn default_true() -> bool {
    true
}

/// Model override and per-model pipeline cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model applied to the preferred provider when building the default pipeline
    #[serde(default)]
    pub name: Option<String>,

    /// Extra models a caller may request; each gets its own pipeline
    #[serde(default)]
    pub allowed: Vec<String>,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            allowed: Vec::new(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    4
}

impl Config {
    /// Load config from `RAGLINE_CONFIG` or the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_path());
        let mut config = Self::load_file(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file, or defaults if it does not exist
    pub fn load_file(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                return Ok(Config::default());
            }
            let config: Config = serde_yaml::from_str(&content)?;
            tracing::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to default path
    pub fn save(&self) -> Result<()> {
        self.save_file(&Self::default_path())
    }

    /// Save config as YAML, creating parent directories
    pub fn save_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Apply flat `RAGLINE_*` overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RAGLINE_OLLAMA_URL") {
            self.ollama.base_url = v;
        }
        if let Some(v) = get("RAGLINE_EMBED_MODEL") {
            self.ollama.embed_model = v;
        }
        if let Some(v) = get("RAGLINE_LLM_MODEL") {
            self.ollama.llm_model = v;
        }
        if let Some(v) = get("RAGLINE_OLLAMA_TIMEOUT") {
            self.ollama.timeout_secs = parse_env("RAGLINE_OLLAMA_TIMEOUT", &v)?;
        }
        if let Some(v) = get("RAGLINE_CLOUD_PROVIDER") {
            self.cloud.provider = v;
        }
        if let Some(v) = get("RAGLINE_CLOUD_URL") {
            self.cloud.api_url = v;
        }
        if let Some(v) = get("RAGLINE_CLOUD_API_KEY") {
            self.cloud.api_key = Some(v);
        }
        if let Some(v) = get("RAGLINE_CLOUD_MODEL") {
            self.cloud.model = v;
        }
        if let Some(v) = get("RAGLINE_CLOUD_TIMEOUT") {
            self.cloud.timeout_secs = parse_env("RAGLINE_CLOUD_TIMEOUT", &v)?;
        }
        if let Some(v) = get("RAGLINE_TOP_K") {
            self.rag.top_k = parse_env("RAGLINE_TOP_K", &v)?;
        }
        if let Some(v) = get("RAGLINE_MIN_SCORE") {
            self.rag.min_score = parse_env("RAGLINE_MIN_SCORE", &v)?;
        }
        if let Some(v) = get("RAGLINE_OVERSAMPLE") {
            self.rag.oversample = parse_env("RAGLINE_OVERSAMPLE", &v)?;
        }
        if let Some(v) = get("RAGLINE_MAX_SNIPPET_CHARS") {
            self.rag.max_snippet_chars = parse_env("RAGLINE_MAX_SNIPPET_CHARS", &v)?;
        }
        if let Some(v) = get("RAGLINE_PROVIDER") {
            self.rag.provider = parse_env("RAGLINE_PROVIDER", &v)?;
        }
        if let Some(v) = get("RAGLINE_FALLBACK") {
            self.rag.fallback_enabled = parse_bool("RAGLINE_FALLBACK", &v)?;
        }
        if let Some(v) = get("RAGLINE_MODEL") {
            self.model.name = Some(v);
        }
        if let Some(v) = get("RAGLINE_INDEX") {
            self.paths.index_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("RAGLINE_LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rag.top_k == 0 {
            return Err(RagError::Config("rag.top_k must be at least 1".to_string()));
        }
        if self.rag.oversample == 0 {
            return Err(RagError::Config(
                "rag.oversample must be at least 1".to_string(),
            ));
        }
        if self.rag.max_snippet_chars == 0 {
            return Err(RagError::Config(
                "rag.max_snippet_chars must be at least 1".to_string(),
            ));
        }
        if !self.rag.min_score.is_finite() {
            return Err(RagError::Config("rag.min_score must be finite".to_string()));
        }
        if self.model.cache_capacity == 0 {
            return Err(RagError::Config(
                "model.cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Retrieval settings for one pipeline instance
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            top_k: self.rag.top_k,
            min_score: self.rag.min_score,
            oversample: self.rag.oversample,
            max_snippet_chars: self.rag.max_snippet_chars,
        }
    }

    /// Routing policy for one pipeline instance
    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy {
            mode: self.rag.provider,
            preference: if self.rag.prefer_primary {
                ProviderSlot::Primary
            } else {
                ProviderSlot::Secondary
            },
            fallback_enabled: self.rag.fallback_enabled,
        }
    }

    /// Slot that receives a model override at construction time
    pub fn preferred_provider(&self) -> ProviderSlot {
        match self.rag.provider {
            ProviderMode::Primary if self.cloud.is_configured() => ProviderSlot::Primary,
            ProviderMode::Secondary => ProviderSlot::Secondary,
            ProviderMode::Auto if self.rag.prefer_primary && self.cloud.is_configured() => {
                ProviderSlot::Primary
            }
            _ => ProviderSlot::Secondary,
        }
    }

    /// Copy with the API key masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.cloud.api_key.is_some() {
            copy.cloud.api_key = Some("***".to_string());
        }
        copy
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| RagError::Config(format!("{}={:?}: {}", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RagError::Config(format!(
            "{}={:?}: expected a boolean",
            key, other
        ))),
    }
}
