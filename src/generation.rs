//! Text generation backends.
//!
//! [`Generator`] is the completion contract the pipeline depends on:
//! `complete(prompt) → text`, and optionally a streaming variant that hands
//! each token fragment to a caller-supplied sink in arrival order.
//! [`OllamaGenerator`] implements both against `/api/generate`; the
//! streaming form reads the newline-delimited JSON body incrementally.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::ollama::OllamaClient;

/// Receives token fragments in generation order.
pub type TokenSink<'a> = dyn FnMut(&str) + Send + 'a;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a full completion in one call.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Generate a completion, passing each fragment to `on_token` as it
    /// arrives. Returns the backend's own view of the full text.
    ///
    /// Backends without streaming support emit the whole answer as one
    /// fragment.
    async fn complete_streaming(&self, prompt: &str, on_token: &mut TokenSink<'_>) -> Result<String> {
        let text = self.complete(prompt).await?;
        on_token(&text);
        Ok(text)
    }
}

/// Completion backed by a local Ollama server.
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: f32,
    context_window: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaGenerator {
    pub fn new(config: &ModelsConfig) -> Result<Self> {
        Ok(Self {
            client: OllamaClient::new(config)?,
            model: config.llm.name.clone(),
            temperature: config.llm.temperature,
            context_window: config.llm.context_window,
        })
    }

    fn request_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": self.temperature,
                "num_ctx": self.context_window,
            },
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = self.request_body(prompt, false);
        let response = self.client.post_json("/api/generate", &body).await?;
        let chunk: GenerateChunk = response.json().await?;
        if let Some(err) = chunk.error {
            return Err(Error::backend(format!("{}: {}", self.model, err)));
        }
        Ok(chunk.response)
    }

    async fn complete_streaming(&self, prompt: &str, on_token: &mut TokenSink<'_>) -> Result<String> {
        let body = self.request_body(prompt, true);
        let response = self.client.post_json("/api/generate", &body).await?;

        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut full = String::new();

        while let Some(bytes) = stream.next().await {
            pending.extend_from_slice(&bytes?);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                if let Some(chunk) = parse_line(&line)? {
                    if let Some(err) = chunk.error {
                        return Err(Error::backend(format!("{}: {}", self.model, err)));
                    }
                    if !chunk.response.is_empty() {
                        on_token(&chunk.response);
                        full.push_str(&chunk.response);
                    }
                    if chunk.done {
                        return Ok(full);
                    }
                }
            }
        }

        // final line without a trailing newline
        if let Some(chunk) = parse_line(&pending)? {
            if !chunk.response.is_empty() {
                on_token(&chunk.response);
                full.push_str(&chunk.response);
            }
        }
        Ok(full)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<GenerateChunk>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(text)?))
}
