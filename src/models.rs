//! Core data models used throughout the assistant.
//!
//! These types represent the managed documents, chunks, retrieval results,
//! and conversation exchanges that flow through ingestion and answering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file held in managed storage.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub path: PathBuf,
    pub name: String,
    /// Lowercase, with the leading dot (e.g. `".pdf"`).
    pub extension: String,
    pub size_bytes: u64,
    pub fingerprint: String,
    pub modified: DateTime<Utc>,
}

/// Metadata attached to every chunk and carried into the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the originating file.
    pub source: String,
    pub filename: String,
    pub file_type: String,
    pub chunk_index: usize,
    /// 1-based page number for chunks cut from a PDF page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
}

/// A slice of a document's text: the atomic retrieval unit.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    /// Byte offset of `text` within the text it was cut from.
    pub start: usize,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by the vector index with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// A cited source in an answer: a preview of the chunk plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Rank in the retrieval order; citation `[n]` is `index + 1`.
    pub index: usize,
    #[serde(default)]
    pub score: f32,
}

/// One question/answer turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
