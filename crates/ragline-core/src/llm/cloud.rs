//! Generic cloud completion client
//!
//! Speaks a minimal JSON contract: `{model, prompt, system}` in,
//! `{"text": "..."}` out, authenticated with a bearer token.

use super::client::{http_client, status_error};
use super::Generator;
use crate::config::CloudConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "cloud";

#[derive(Serialize)]
struct CloudRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
}

#[derive(Deserialize)]
struct CloudResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Generator backed by a hosted completion endpoint
pub struct CloudGenerator {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl CloudGenerator {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout_secs)?,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Create from configuration, optionally replacing the configured model
    pub fn from_config(config: &CloudConfig, model_override: Option<&str>) -> Result<Self> {
        if !config.is_configured() {
            return Err(RagError::Config(
                "cloud provider requires api_url and api_key".to_string(),
            ));
        }
        let api_key = config.api_key.as_deref().unwrap_or_default();
        let model = model_override.unwrap_or(&config.model);
        Self::new(&config.api_url, api_key, model, config.timeout_secs)
    }
}

#[async_trait]
impl Generator for CloudGenerator {
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let request = CloudRequest {
            model: &self.model,
            prompt,
            system: system.unwrap_or(""),
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(status_error(SERVICE, response).await);
        }

        let body: CloudResponse = response
            .json()
            .await
            .map_err(|e| RagError::from_http(SERVICE, e))?;

        body.text.ok_or_else(|| {
            RagError::UpstreamProtocol(format!("{}: response has no `text` field", SERVICE))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        SERVICE
    }
}
