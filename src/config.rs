//! TOML configuration.
//!
//! Every operational parameter of the assistant comes from one file, loaded
//! once at start-up with [`load_config`]. Only `[storage]` is mandatory; every
//! other section falls back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Managed storage: admitted files are copied here.
    pub data_path: PathBuf,
    /// Directory owned by the vector index.
    pub vectordb_path: PathBuf,
    pub history_path: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

fn default_history_file() -> String {
    "chat_history.json".to_string()
}
fn default_collection_name() -> String {
    "documents".to_string()
}

impl StorageConfig {
    pub fn history_file_path(&self) -> PathBuf {
        self.history_path.join(&self.history_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Applies both per file and to the total of one upload batch.
    #[serde(default = "default_upload_limit_mb")]
    pub upload_limit_mb: f64,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            upload_limit_mb: default_upload_limit_mb(),
            max_documents: default_max_documents(),
        }
    }
}

fn default_app_name() -> String {
    "DocQA".to_string()
}
fn default_upload_limit_mb() -> f64 {
    50.0
}
fn default_max_documents() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Tried in order; an empty string means "cut between characters".
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// `"similarity"` or `"mmr"`.
    #[serde(default = "default_search_type")]
    pub search_type: String,
    /// MMR lambda: 1.0 is pure relevance, 0.0 is pure diversity.
    #[serde(default = "default_mmr_diversity")]
    pub mmr_diversity: f32,
    #[serde(default = "default_fetch_k_multiplier")]
    pub fetch_k_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            search_type: default_search_type(),
            mmr_diversity: default_mmr_diversity(),
            fetch_k_multiplier: default_fetch_k_multiplier(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_search_type() -> String {
    "similarity".to_string()
}
fn default_mmr_diversity() -> f32 {
    0.5
}
fn default_fetch_k_multiplier() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure. Off by default: an
    /// unavailable backend is reported on the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            embeddings: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    0
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            name: default_llm_model(),
            temperature: default_temperature(),
            context_window: default_context_window(),
        }
    }
}

fn default_llm_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_context_window() -> u32 {
    4096
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Rendering preferences; only the CLI reads these.
#[derive(Debug, Deserialize, Clone)]
pub struct UiConfig {
    #[serde(default = "default_true")]
    pub show_sources: bool,
    #[serde(default = "default_true")]
    pub show_citations: bool,
    #[serde(default = "default_history_display")]
    pub max_chat_history_display: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_sources: true,
            show_citations: true,
            max_chat_history_display: default_history_display(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_history_display() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate quotas
    if config.app.upload_limit_mb <= 0.0 {
        anyhow::bail!("app.upload_limit_mb must be > 0");
    }
    if config.app.max_documents == 0 {
        anyhow::bail!("app.max_documents must be >= 1");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.mmr_diversity) {
        anyhow::bail!("retrieval.mmr_diversity must be in [0.0, 1.0]");
    }
    if config.retrieval.fetch_k_multiplier == 0 {
        anyhow::bail!("retrieval.fetch_k_multiplier must be >= 1");
    }
    match config.retrieval.search_type.as_str() {
        "similarity" | "mmr" => {}
        other => anyhow::bail!(
            "Unknown retrieval.search_type: '{}'. Must be similarity or mmr.",
            other
        ),
    }

    // Validate models
    match config.models.embeddings.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }
    if config.models.embeddings.batch_size == 0 {
        anyhow::bail!("models.embeddings.batch_size must be >= 1");
    }

    Ok(config)
}
