//! HTTP plumbing shared by the Ollama embedding and generation backends.
//!
//! A failed request surfaces as [`Error::BackendUnavailable`] on the first
//! failure; the caller decides whether to try again.
//!
//! # Opt-in retries
//!
//! With `models.max_retries > 0`, transient failures are retried with
//! exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use serde::Deserialize;
use std::time::Duration;

use crate::config::ModelsConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &ModelsConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// POST a JSON body to `path`. Transient failures are retried only up to
    /// `max_retries` extra times.
    pub(crate) async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::warn!(
                    url = %url,
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    "retrying request in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.http.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = Error::backend(format!("{} returned {}: {}", url, status, body_text));

                    // rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(Error::backend(format!("{}: {}", url, e)));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::backend(format!("{}: request failed", url))))
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<Model>,
        }
        #[derive(Deserialize)]
        struct Model {
            name: String,
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::backend(format!("cannot reach {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::backend(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let tags: Tags = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Result of probing the model server.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub base_url: String,
    pub reachable: bool,
    pub error: Option<String>,
    pub installed: Vec<String>,
    pub missing: Vec<String>,
}

impl BackendStatus {
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.missing.is_empty()
    }
}

/// Check that the server answers and that every configured model is installed.
pub async fn check_backend(config: &ModelsConfig) -> BackendStatus {
    let mut required = vec![config.llm.name.clone()];
    if config.embeddings.is_enabled() {
        required.push(config.embeddings.name.clone());
    }

    let listed = match OllamaClient::new(config) {
        Ok(client) => client.list_models().await,
        Err(e) => Err(e),
    };

    match listed {
        Ok(installed) => BackendStatus {
            base_url: config.base_url.clone(),
            reachable: true,
            error: None,
            missing: missing_models(&required, &installed),
            installed,
        },
        Err(e) => BackendStatus {
            base_url: config.base_url.clone(),
            reachable: false,
            error: Some(e.to_string()),
            installed: Vec::new(),
            missing: required,
        },
    }
}

/// A required model counts as present when an installed name contains it
/// (`llama3.2` matches `llama3.2:latest`).
fn missing_models(required: &[String], installed: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|r| !installed.iter().any(|name| name.contains(r.as_str())))
        .cloned()
        .collect()
}
