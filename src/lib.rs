//! # DocQA
//!
//! A local document question-answering assistant.
//!
//! Files are validated and copied into managed storage, split into
//! overlapping chunks, embedded, and stored in a vector index. Questions are
//! answered by retrieving the most relevant chunks, grounding a prompt in
//! them, and asking a local model, with every answer citing its sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Ingestion   │──▶│   Pipeline   │──▶│ VectorIndex │
//! │ validate+copy│   │ load+chunk   │   │ SQLite/mem  │
//! └──────────────┘   └──────┬───────┘   └──────┬──────┘
//!                           │ query            │ top-k / MMR
//!                           ▼                  │
//!                    ┌──────────────┐          │
//!                    │  Generator   │◀─────────┘
//!                    │   (Ollama)   │  prompt + context
//!                    └──────┬───────┘
//!                           ▼
//!                    ConversationLog
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init
//! docqa ingest paper.pdf notes.md
//! docqa ask "What were the main findings?"
//! docqa history
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`validate`] | File admission checks |
//! | [`fingerprint`] | Content hashing for duplicate detection |
//! | [`ingest`] | Managed document storage |
//! | [`extract`] | PDF and plain-text loading |
//! | [`chunk`] | Recursive text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Text generation backends |
//! | [`ollama`] | Shared Ollama HTTP client and health check |
//! | [`index`] | Vector index implementations |
//! | [`retrieval`] | Similarity and MMR ranking |
//! | [`prompt`] | Prompt assembly and source previews |
//! | [`pipeline`] | Retrieval-augmented answering |
//! | [`history`] | Conversation log |
//! | [`logging`] | Tracing subscriber setup |
//! | [`system`] | Host memory and CPU snapshot |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod generation;
pub mod history;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod ollama;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod system;
pub mod validate;

pub use error::{Error, Result};
