//! Provider selection and single-step fallback
//!
//! The router holds up to two generators: the primary (usually a hosted
//! endpoint) and the secondary (usually local Ollama). Selection is a pure
//! function of the routing policy, an optional per-request override and which
//! slots are wired. A failed attempt on the selected provider is retried once
//! on the other slot when fallback is enabled.
//!
//! Streaming uses the same rule, decided on the first fragment: the router
//! waits for the selected stream to produce its first item. An error before
//! that point triggers fallback; after it, the stream is committed and later
//! errors reach the caller as stream items.

use crate::error::{RagError, Result};
use crate::llm::{Generator, TextStream};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One of the two generator positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSlot {
    Primary,
    Secondary,
}

impl ProviderSlot {
    pub fn label(self) -> &'static str {
        match self {
            ProviderSlot::Primary => "primary",
            ProviderSlot::Secondary => "secondary",
        }
    }

    /// The alternate slot
    pub fn other(self) -> Self {
        match self {
            ProviderSlot::Primary => ProviderSlot::Secondary,
            ProviderSlot::Secondary => ProviderSlot::Primary,
        }
    }
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configured provider-selection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Primary,
    Secondary,
    /// Use the stored preference, or whichever slot is wired
    #[default]
    Auto,
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "cloud" => Ok(ProviderMode::Primary),
            "secondary" | "ollama" | "local" => Ok(ProviderMode::Secondary),
            "auto" => Ok(ProviderMode::Auto),
            other => Err(format!(
                "unknown provider mode '{}', expected primary, secondary or auto",
                other
            )),
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderMode::Primary => "primary",
            ProviderMode::Secondary => "secondary",
            ProviderMode::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Read-only routing configuration of one router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub mode: ProviderMode,
    /// Slot chosen by `auto` mode when it is wired
    pub preference: ProviderSlot,
    pub fallback_enabled: bool,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Auto,
            preference: ProviderSlot::Primary,
            fallback_enabled: true,
        }
    }
}

/// Pick the slot that handles a request.
///
/// An explicit override always wins and must name a wired slot. Otherwise an
/// explicit mode must name a wired slot, and `auto` takes the preference when
/// wired or else the other slot.
pub fn select_provider(
    override_slot: Option<ProviderSlot>,
    policy: &RoutingPolicy,
    primary_available: bool,
    secondary_available: bool,
) -> Result<ProviderSlot> {
    let available = |slot: ProviderSlot| match slot {
        ProviderSlot::Primary => primary_available,
        ProviderSlot::Secondary => secondary_available,
    };

    if let Some(slot) = override_slot {
        return if available(slot) {
            Ok(slot)
        } else {
            Err(RagError::ClientRequest(format!(
                "requested {} provider is not configured",
                slot
            )))
        };
    }

    let explicit = match policy.mode {
        ProviderMode::Primary => Some(ProviderSlot::Primary),
        ProviderMode::Secondary => Some(ProviderSlot::Secondary),
        ProviderMode::Auto => None,
    };
    if let Some(slot) = explicit {
        return if available(slot) {
            Ok(slot)
        } else {
            Err(RagError::Config(format!(
                "provider mode is '{}' but no {} provider is configured",
                policy.mode, slot
            )))
        };
    }

    let preferred = policy.preference;
    if available(preferred) {
        Ok(preferred)
    } else if available(preferred.other()) {
        Ok(preferred.other())
    } else {
        Err(RagError::Config(
            "no generation provider is configured".to_string(),
        ))
    }
}

/// Result of a blocking generation
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub provider: ProviderSlot,
    pub used_fallback: bool,
}

/// Result of a streaming generation, committed to one provider
pub struct StreamingGeneration {
    pub model: String,
    pub provider: ProviderSlot,
    pub used_fallback: bool,
    pub fragments: TextStream,
}

impl fmt::Debug for StreamingGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingGeneration")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("used_fallback", &self.used_fallback)
            .finish_non_exhaustive()
    }
}

/// Routes generation requests across the primary and secondary providers
#[derive(Clone)]
pub struct ProviderRouter {
    primary: Option<Arc<dyn Generator>>,
    secondary: Option<Arc<dyn Generator>>,
    policy: RoutingPolicy,
}

impl ProviderRouter {
    pub fn new(
        primary: Option<Arc<dyn Generator>>,
        secondary: Option<Arc<dyn Generator>>,
        policy: RoutingPolicy,
    ) -> Self {
        Self {
            primary,
            secondary,
            policy,
        }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn provider(&self, slot: ProviderSlot) -> Option<&Arc<dyn Generator>> {
        match slot {
            ProviderSlot::Primary => self.primary.as_ref(),
            ProviderSlot::Secondary => self.secondary.as_ref(),
        }
    }

    pub fn available(&self, slot: ProviderSlot) -> bool {
        self.provider(slot).is_some()
    }

    /// Slot the router would use without an override
    pub fn default_slot(&self) -> Result<ProviderSlot> {
        self.select(None)
    }

    /// Map a requested model name onto a wired slot.
    ///
    /// Accepts a slot label (`primary`, `secondary`), a provider name
    /// (`cloud`, `ollama`) or a provider's model id. The primary slot is
    /// checked first.
    pub fn resolve_model(&self, name: &str) -> Result<ProviderSlot> {
        let wanted = name.trim();
        if wanted.is_empty() {
            return Err(RagError::ClientRequest("model name is empty".to_string()));
        }

        for slot in [ProviderSlot::Primary, ProviderSlot::Secondary] {
            let Some(generator) = self.provider(slot) else {
                continue;
            };
            if wanted.eq_ignore_ascii_case(slot.label())
                || wanted.eq_ignore_ascii_case(generator.provider_name())
                || wanted == generator.model_name()
            {
                return Ok(slot);
            }
        }

        Err(RagError::ClientRequest(format!(
            "unknown model '{}'; available: {}",
            wanted,
            self.describe_models()
        )))
    }

    /// Human-readable list of wired models
    pub fn describe_models(&self) -> String {
        let listed: Vec<String> = [ProviderSlot::Primary, ProviderSlot::Secondary]
            .into_iter()
            .filter_map(|slot| {
                self.provider(slot).map(|g| {
                    format!("{} ({}: {})", slot, g.provider_name(), g.model_name())
                })
            })
            .collect();
        if listed.is_empty() {
            "none".to_string()
        } else {
            listed.join(", ")
        }
    }

    fn select(&self, override_slot: Option<ProviderSlot>) -> Result<ProviderSlot> {
        select_provider(
            override_slot,
            &self.policy,
            self.primary.is_some(),
            self.secondary.is_some(),
        )
    }

    /// Generator and slot for the request
    fn selected(
        &self,
        override_slot: Option<ProviderSlot>,
    ) -> Result<(ProviderSlot, Arc<dyn Generator>)> {
        let slot = self.select(override_slot)?;
        let generator = self
            .provider(slot)
            .cloned()
            .ok_or_else(|| RagError::Config(format!("no {} provider is configured", slot)))?;
        Ok((slot, generator))
    }

    /// Alternate generator, if fallback is enabled and one is wired
    fn fallback_for(&self, slot: ProviderSlot) -> Option<(ProviderSlot, Arc<dyn Generator>)> {
        if !self.policy.fallback_enabled {
            return None;
        }
        let other = slot.other();
        self.provider(other).cloned().map(|g| (other, g))
    }

    /// Generate a complete answer, falling back once on failure
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        override_slot: Option<ProviderSlot>,
    ) -> Result<Generation> {
        let (slot, generator) = self.selected(override_slot)?;
        tracing::debug!(
            "Generating with {} provider ({})",
            slot,
            generator.model_name()
        );

        let err = match generator.generate(prompt, system).await {
            Ok(text) => {
                return Ok(Generation {
                    text,
                    model: generator.model_name().to_string(),
                    provider: slot,
                    used_fallback: false,
                })
            }
            Err(e) => e,
        };

        let Some((fallback_slot, fallback)) = self.fallback_for(slot) else {
            return Err(err);
        };
        tracing::warn!(
            "{} provider ({}) failed: {}; falling back to {} ({})",
            slot,
            generator.model_name(),
            err,
            fallback_slot,
            fallback.model_name()
        );

        let text = fallback.generate(prompt, system).await?;
        Ok(Generation {
            text,
            model: fallback.model_name().to_string(),
            provider: fallback_slot,
            used_fallback: true,
        })
    }

    /// Open a fragment stream, falling back once if the selected provider
    /// fails before producing its first fragment
    pub async fn stream(
        &self,
        prompt: &str,
        system: Option<&str>,
        override_slot: Option<ProviderSlot>,
    ) -> Result<StreamingGeneration> {
        let (slot, generator) = self.selected(override_slot)?;
        tracing::debug!(
            "Streaming with {} provider ({})",
            slot,
            generator.model_name()
        );

        let err = match open_committed(generator.as_ref(), prompt, system).await {
            Ok(fragments) => {
                return Ok(StreamingGeneration {
                    model: generator.model_name().to_string(),
                    provider: slot,
                    used_fallback: false,
                    fragments,
                })
            }
            Err(e) => e,
        };

        let Some((fallback_slot, fallback)) = self.fallback_for(slot) else {
            return Err(err);
        };
        tracing::warn!(
            "{} stream ({}) failed before its first fragment: {}; falling back to {} ({})",
            slot,
            generator.model_name(),
            err,
            fallback_slot,
            fallback.model_name()
        );

        let fragments = open_committed(fallback.as_ref(), prompt, system).await?;
        Ok(StreamingGeneration {
            model: fallback.model_name().to_string(),
            provider: fallback_slot,
            used_fallback: true,
            fragments,
        })
    }
}

/// Open a provider stream and wait for its first item.
///
/// Returns the stream with that first fragment re-attached, or the error the
/// provider raised before producing anything. An empty stream is a success.
async fn open_committed(
    generator: &dyn Generator,
    prompt: &str,
    system: Option<&str>,
) -> Result<TextStream> {
    let mut fragments = generator.stream(prompt, system).await?;
    let committed: TextStream = match fragments.next().await {
        Some(Ok(first)) => Box::pin(stream::once(async move { Ok(first) }).chain(fragments)),
        Some(Err(e)) => return Err(e),
        None => Box::pin(stream::empty()),
    };
    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        model: &'static str,
        provider: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(model: &'static str, provider: &'static str) -> Arc<Self> {
            Arc::new(Self {
                model,
                provider,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(model: &'static str, provider: &'static str) -> Arc<Self> {
            Arc::new(Self {
                model,
                provider,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, _prompt: &str, _system: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RagError::Timeout(format!("{} timed out", self.provider)))
            } else {
                Ok(format!("answer from {}", self.model))
            }
        }

        fn model_name(&self) -> &str {
            self.model
        }

        fn provider_name(&self) -> &str {
            self.provider
        }
    }

    fn router(
        primary: Option<Arc<Scripted>>,
        secondary: Option<Arc<Scripted>>,
        policy: RoutingPolicy,
    ) -> ProviderRouter {
        ProviderRouter::new(
            primary.map(|g| g as Arc<dyn Generator>),
            secondary.map(|g| g as Arc<dyn Generator>),
            policy,
        )
    }

    #[test]
    fn test_select_auto_prefers_then_falls_to_other() {
        let policy = RoutingPolicy::default();
        assert_eq!(
            select_provider(None, &policy, true, true).unwrap(),
            ProviderSlot::Primary
        );
        assert_eq!(
            select_provider(None, &policy, false, true).unwrap(),
            ProviderSlot::Secondary
        );
        let prefer_local = RoutingPolicy {
            preference: ProviderSlot::Secondary,
            ..policy
        };
        assert_eq!(
            select_provider(None, &prefer_local, true, true).unwrap(),
            ProviderSlot::Secondary
        );
        assert!(matches!(
            select_provider(None, &policy, false, false),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_select_explicit_mode_and_override() {
        let primary_only = RoutingPolicy {
            mode: ProviderMode::Primary,
            ..RoutingPolicy::default()
        };
        assert!(matches!(
            select_provider(None, &primary_only, false, true),
            Err(RagError::Config(_))
        ));
        assert_eq!(
            select_provider(Some(ProviderSlot::Secondary), &primary_only, true, true).unwrap(),
            ProviderSlot::Secondary
        );
        assert!(matches!(
            select_provider(Some(ProviderSlot::Primary), &primary_only, false, true),
            Err(RagError::ClientRequest(_))
        ));
    }

    #[test]
    fn test_provider_mode_parsing() {
        assert_eq!("AUTO".parse::<ProviderMode>().unwrap(), ProviderMode::Auto);
        assert_eq!("ollama".parse::<ProviderMode>().unwrap(), ProviderMode::Secondary);
        assert!("both".parse::<ProviderMode>().is_err());
    }

    #[test]
    fn test_resolve_model() {
        let r = router(
            Some(Scripted::ok("best-model", "cloud")),
            Some(Scripted::ok("llama3", "ollama")),
            RoutingPolicy::default(),
        );
        assert_eq!(r.resolve_model("Secondary").unwrap(), ProviderSlot::Secondary);
        assert_eq!(r.resolve_model("cloud").unwrap(), ProviderSlot::Primary);
        assert_eq!(r.resolve_model("llama3").unwrap(), ProviderSlot::Secondary);
        assert!(matches!(
            r.resolve_model("gpt-unknown"),
            Err(RagError::ClientRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_primary_success() {
        let primary = Scripted::ok("best-model", "cloud");
        let secondary = Scripted::ok("llama3", "ollama");
        let r = router(Some(primary.clone()), Some(secondary.clone()), RoutingPolicy::default());

        let out = r.generate("p", Some("s"), None).await.unwrap();
        assert!(!out.used_fallback);
        assert_eq!(out.model, "best-model");
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_after_failure() {
        let primary = Scripted::failing("best-model", "cloud");
        let secondary = Scripted::ok("llama3", "ollama");
        let r = router(Some(primary.clone()), Some(secondary.clone()), RoutingPolicy::default());

        let out = r.generate("p", None, None).await.unwrap();
        assert!(out.used_fallback);
        assert_eq!(out.model, "llama3");
        assert_eq!(out.provider, ProviderSlot::Secondary);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_disabled_propagates() {
        let primary = Scripted::failing("best-model", "cloud");
        let secondary = Scripted::ok("llama3", "ollama");
        let policy = RoutingPolicy {
            fallback_enabled: false,
            ..RoutingPolicy::default()
        };
        let r = router(Some(primary.clone()), Some(secondary.clone()), policy);

        let err = r.generate("p", None, None).await.unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_both_fail_returns_secondary_error() {
        let primary = Scripted::failing("best-model", "cloud");
        let secondary = Scripted::failing("llama3", "ollama");
        let r = router(Some(primary.clone()), Some(secondary.clone()), RoutingPolicy::default());

        let err = r.generate("p", None, None).await.unwrap_err();
        assert!(err.to_string().contains("ollama"));
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_default_single_fragment() {
        let r = router(None, Some(Scripted::ok("llama3", "ollama")), RoutingPolicy::default());
        let out = r.stream("p", None, None).await.unwrap();
        assert!(!out.used_fallback);
        let fragments: Vec<String> = out.fragments.try_collect().await.unwrap();
        assert_eq!(fragments, vec!["answer from llama3".to_string()]);
    }
}
