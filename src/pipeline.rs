//! Retrieval-augmented answering over the indexed documents.
//!
//! [`RagPipeline`] is a long-lived service object: built once with
//! [`RagPipeline::open`] (or [`RagPipeline::new`] from explicit parts) and
//! shared by reference. Every operation takes `&self`; a failed call leaves
//! the index as it was and the pipeline usable.
//!
//! # Ingestion
//!
//! ```text
//! paths ──▶ load_units ──▶ Chunker ──▶ VectorIndex::add
//!           (skip bad files)           (embed + store)
//! ```
//!
//! # Answering
//!
//! ```text
//! question ──▶ VectorIndex::query(top_k, mode) ──▶ build_prompt ──▶ Generator
//!                                                                      │
//!                         QueryAnswer { answer, sources } ◀───────────┘
//! ```
//!
//! An empty index is refused with [`Error::EmptyKnowledgeBase`] before the
//! generator is ever called, so answers are always grounded in stored text.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::{Error, Result};
use crate::extract::load_units;
use crate::generation::{Generator, OllamaGenerator, TokenSink};
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::{Chunk, SourceRef};
use crate::prompt::{build_prompt, source_refs};
use crate::retrieval::SearchMode;

/// Coarse pipeline state. A pipeline only exists once opened, so there is
/// no uninitialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Ready,
    ReadyWithDocuments,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddReport {
    /// Text units loaded: one per text file, one per PDF page.
    pub document_count: usize,
    pub chunk_count: usize,
    /// Files skipped because their text could not be loaded.
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    /// Number of stored chunks.
    pub document_count: usize,
    pub collection_name: String,
    pub path: Option<PathBuf>,
}

pub struct RagPipeline {
    chunker: Chunker,
    index: Box<dyn VectorIndex>,
    generator: Box<dyn Generator>,
    top_k: usize,
    mode: SearchMode,
    streaming: bool,
}

impl RagPipeline {
    /// Assemble a pipeline around an existing index and generator.
    pub fn new(config: &Config, index: Box<dyn VectorIndex>, generator: Box<dyn Generator>) -> Self {
        Self {
            chunker: Chunker::new(&config.chunking),
            index,
            generator,
            top_k: config.retrieval.top_k,
            mode: SearchMode::from_config(&config.retrieval),
            streaming: config.performance.streaming,
        }
    }

    /// Create the storage directories and open the configured backends:
    /// a [`SqliteIndex`] under `storage.vectordb_path` and Ollama for
    /// embeddings and completion.
    pub async fn open(config: &Config) -> Result<Self> {
        for dir in [
            &config.storage.data_path,
            &config.storage.vectordb_path,
            &config.storage.history_path,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        let embedder = create_provider(&config.models)?;
        let index = SqliteIndex::open(
            &config.storage.vectordb_path,
            &config.storage.collection_name,
            embedder,
            config.models.embeddings.batch_size,
        )
        .await?;
        let generator = OllamaGenerator::new(&config.models)?;

        let pipeline = Self::new(config, Box::new(index), Box::new(generator));
        let chunks = pipeline.index.count().await?;
        tracing::info!(
            collection = %config.storage.collection_name,
            chunks,
            mode = pipeline.mode.label(),
            "pipeline ready"
        );
        Ok(pipeline)
    }

    pub fn search_mode(&self) -> SearchMode {
        self.mode
    }

    /// Load, chunk, and index the given files.
    ///
    /// Files that fail to load are logged and skipped. PDF pages are chunked
    /// separately and their chunks carry the page number. Fails with
    /// [`Error::NoValidDocuments`] when nothing loaded and
    /// [`Error::NoChunksProduced`] when everything loaded empty.
    pub async fn add_documents(&self, paths: &[PathBuf]) -> Result<AddReport> {
        let mut document_count = 0;
        let mut skipped = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();

        for path in paths {
            match load_units(path) {
                Ok(units) => {
                    let doc_chunks = self.chunker.chunk_units(&units, path);
                    tracing::info!(
                        file = %path.display(),
                        units = units.len(),
                        chunks = doc_chunks.len(),
                        "loaded document"
                    );
                    document_count += units.len();
                    chunks.extend(doc_chunks);
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unloadable document");
                    skipped.push(path.clone());
                }
            }
        }

        if document_count == 0 {
            return Err(Error::NoValidDocuments);
        }
        if chunks.is_empty() {
            return Err(Error::NoChunksProduced);
        }

        self.index.add(&chunks).await?;
        tracing::info!(
            documents = document_count,
            chunks = chunks.len(),
            "added documents to index"
        );

        Ok(AddReport {
            document_count,
            chunk_count: chunks.len(),
            skipped,
        })
    }

    /// Answer a question from the indexed documents.
    ///
    /// With `performance.streaming` on, the answer is assembled from streamed
    /// fragments.
    pub async fn query(&self, question: &str) -> Result<QueryAnswer> {
        if self.streaming {
            self.query_streaming(question, &mut |_: &str| {}).await
        } else {
            let (prompt, sources) = self.retrieve(question).await?;
            let answer = self.generator.complete(&prompt).await?;
            Ok(QueryAnswer { answer, sources })
        }
    }

    /// Answer a question, passing each generated fragment to `on_token` as
    /// it arrives. The final answer is the fragments concatenated in arrival
    /// order, or the backend's full result if no fragment arrived.
    pub async fn query_streaming(
        &self,
        question: &str,
        on_token: &mut TokenSink<'_>,
    ) -> Result<QueryAnswer> {
        let (prompt, sources) = self.retrieve(question).await?;

        let mut streamed = String::new();
        let mut sink = |token: &str| {
            streamed.push_str(token);
            on_token(token);
        };
        let full = self.generator.complete_streaming(&prompt, &mut sink).await?;

        let answer = if streamed.is_empty() { full } else { streamed };
        Ok(QueryAnswer { answer, sources })
    }

    async fn retrieve(&self, question: &str) -> Result<(String, Vec<SourceRef>)> {
        if self.index.count().await? == 0 {
            return Err(Error::EmptyKnowledgeBase);
        }
        let hits = self.index.query(question, self.top_k, &self.mode).await?;
        tracing::debug!(hits = hits.len(), mode = self.mode.label(), "retrieved context");
        Ok((build_prompt(question, &hits), source_refs(&hits)))
    }

    /// The subset of `paths` with no chunks in the index yet, in input order.
    pub async fn unindexed(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut pending = Vec::new();
        for path in paths {
            if !self.index.contains_source(&path.to_string_lossy()).await? {
                pending.push(path.clone());
            }
        }
        Ok(pending)
    }

    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        Ok(CollectionInfo {
            document_count: self.index.count().await?,
            collection_name: self.index.name().to_string(),
            path: self.index.location().map(Path::to_path_buf),
        })
    }

    /// Remove every indexed chunk. The pipeline stays usable.
    pub async fn clear_index(&self) -> Result<()> {
        self.index.delete_all().await?;
        tracing::info!(collection = %self.index.name(), "index cleared");
        Ok(())
    }

    pub async fn state(&self) -> Result<PipelineState> {
        Ok(if self.index.count().await? > 0 {
            PipelineState::ReadyWithDocuments
        } else {
            PipelineState::Ready
        })
    }
}
