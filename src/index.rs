//! Vector index: embedded chunk storage with similarity search.
//!
//! [`VectorIndex`] is the boundary contract the pipeline talks to:
//! `add`, `query`, `count`, `contains_source`, `delete_all`. Each implementation owns an
//! [`EmbeddingProvider`] and embeds both stored chunks and query text itself.
//!
//! - **[`SqliteIndex`]**: persisted under `storage.vectordb_path/index.sqlite`
//!   (WAL mode). Vectors are stored as little-endian f32 BLOBs and scored by
//!   brute-force cosine similarity in Rust.
//! - **[`MemoryIndex`]**: same semantics, held in memory; for tests and
//!   throwaway sessions.
//!
//! Results come back in descending similarity order, or MMR selection order
//! in diversity mode. Equal scores fall back to insertion order.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMetadata, ScoredChunk};
use crate::retrieval::{mmr_select, rank_by_score, SearchMode};

pub const INDEX_FILE: &str = "index.sqlite";

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Where the index persists, if anywhere.
    fn location(&self) -> Option<&Path>;

    /// Embed and store chunks. Either every chunk is stored or none is.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Up to `k` stored chunks most relevant to `text`.
    async fn query(&self, text: &str, k: usize, mode: &SearchMode) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<usize>;

    /// Whether any stored chunk came from `source` (the path it was loaded from).
    async fn contains_source(&self, source: &str) -> Result<bool>;

    /// Remove every entry; the index stays usable.
    async fn delete_all(&self) -> Result<()>;
}

/// One stored entry as read back for scoring.
struct Entry {
    text: String,
    metadata: ChunkMetadata,
    vector: Vec<f32>,
}

/// Score entries (given in insertion order) against `query` and pick up to `k`.
fn rank_entries(query: &[f32], entries: Vec<Entry>, k: usize, mode: &SearchMode) -> Vec<ScoredChunk> {
    let scores: Vec<f32> = entries
        .iter()
        .map(|e| cosine_similarity(query, &e.vector))
        .collect();
    let candidates = rank_by_score(&scores, mode.candidate_count(k));

    let order = match mode {
        SearchMode::Similarity => candidates.into_iter().take(k).collect::<Vec<_>>(),
        SearchMode::Mmr { lambda, .. } => {
            let relevance: Vec<f32> = candidates.iter().map(|&i| scores[i]).collect();
            let vectors: Vec<Vec<f32>> = candidates
                .iter()
                .map(|&i| entries[i].vector.clone())
                .collect();
            mmr_select(&relevance, &vectors, k, *lambda)
                .into_iter()
                .map(|pos| candidates[pos])
                .collect()
        }
    };

    let mut slots: Vec<Option<Entry>> = entries.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| {
            slots[i].take().map(|e| ScoredChunk {
                text: e.text,
                metadata: e.metadata,
                score: scores[i],
            })
        })
        .collect()
}

/// Embed chunk texts in batches, checking the provider kept count.
async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        if embedded.len() != texts.len() {
            return Err(Error::backend(format!(
                "embedding backend returned {} vectors for {} chunks",
                embedded.len(),
                texts.len()
            )));
        }
        vectors.extend(embedded);
    }
    Ok(vectors)
}

// ============ SQLite ============

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    path: PathBuf,
    embedder: Box<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl SqliteIndex {
    /// Open (creating if needed) the index in `dir`.
    pub async fn open(
        dir: &Path,
        collection: &str,
        embedder: Box<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate(&pool).await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
            path,
            embedder,
            batch_size,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries(collection)")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        // embed everything before touching the table
        let vectors = embed_chunks(self.embedder.as_ref(), chunks, self.batch_size).await?;
        let model = self.embedder.model_name().to_string();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            sqlx::query(
                r#"
                INSERT INTO entries (id, collection, text, metadata_json, embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&self.collection)
            .bind(&chunk.text)
            .bind(serde_json::to_string(&chunk.metadata)?)
            .bind(vec_to_blob(vector))
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            collection = %self.collection,
            added = chunks.len(),
            "stored chunk embeddings"
        );
        Ok(chunks.len())
    }

    async fn query(&self, text: &str, k: usize, mode: &SearchMode) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(text).await?;

        let rows = sqlx::query(
            "SELECT text, metadata_json, embedding FROM entries WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.try_get("metadata_json")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            entries.push(Entry {
                text: row.try_get("text")?,
                metadata: serde_json::from_str(&metadata_json)?,
                vector: blob_to_vec(&blob),
            });
        }

        Ok(rank_entries(&query_vec, entries, k, mode))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn contains_source(&self, source: &str) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM entries
                WHERE collection = ? AND json_extract(metadata_json, '$.source') = ?
            )
            "#,
        )
        .bind(&self.collection)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn delete_all(&self) -> Result<()> {
        let removed = sqlx::query("DELETE FROM entries WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?
            .rows_affected();
        tracing::info!(collection = %self.collection, removed, "cleared vector index");
        Ok(())
    }
}

// ============ In-memory ============

pub struct MemoryIndex {
    collection: String,
    embedder: Box<dyn EmbeddingProvider>,
    entries: RwLock<Vec<Entry>>,
}

impl MemoryIndex {
    pub fn new(collection: &str, embedder: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            collection: collection.to_string(),
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    fn location(&self) -> Option<&Path> {
        None
    }

    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let vectors = embed_chunks(self.embedder.as_ref(), chunks, usize::MAX).await?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.extend(chunks.iter().zip(vectors).map(|(chunk, vector)| Entry {
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
            vector,
        }));
        Ok(chunks.len())
    }

    async fn query(&self, text: &str, k: usize, mode: &SearchMode) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.len() == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(text).await?;
        let snapshot: Vec<Entry> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| Entry {
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                vector: e.vector.clone(),
            })
            .collect();
        Ok(rank_entries(&query_vec, snapshot, k, mode))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.len())
    }

    async fn contains_source(&self, source: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|e| e.metadata.source == source))
    }

    async fn delete_all(&self) -> Result<()> {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Maps text onto three axes by keyword.
    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.matches("rust").count() as f32,
                        t.matches("python").count() as f32,
                        t.matches("cooking").count() as f32 + 0.01,
                    ]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::backend("connection refused"))
        }
    }

    fn chunk(text: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            start: 0,
            metadata: ChunkMetadata {
                source: "/data/notes.txt".to_string(),
                filename: "notes.txt".to_string(),
                file_type: ".txt".to_string(),
                chunk_index: index,
                page: Some(index + 1),
            },
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("rust ownership and borrowing", 0),
            chunk("python list comprehensions", 1),
            chunk("cooking pasta al dente", 2),
            chunk("rust traits", 3),
        ]
    }

    #[tokio::test]
    async fn test_sqlite_add_query_count_clear() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path(), "documents", Box::new(AxisEmbedder), 2)
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index
            .query("rust", 3, &SearchMode::Similarity)
            .await
            .unwrap()
            .is_empty());

        assert_eq!(index.add(&corpus()).await.unwrap(), 4);
        assert_eq!(index.count().await.unwrap(), 4);
        assert_eq!(index.location(), Some(tmp.path().join(INDEX_FILE).as_path()));

        let hits = index.query("rust", 2, &SearchMode::Similarity).await.unwrap();
        assert_eq!(hits.len(), 2);
        // equal scores: insertion order
        assert_eq!(hits[0].metadata.chunk_index, 0);
        assert_eq!(hits[1].metadata.chunk_index, 3);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].metadata.filename, "notes.txt");
        assert_eq!(hits[1].metadata.page, Some(4));

        index.delete_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        index.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let index = SqliteIndex::open(tmp.path(), "documents", Box::new(AxisEmbedder), 8)
                .await
                .unwrap();
            index.add(&corpus()).await.unwrap();
            index.close().await;
        }
        let index = SqliteIndex::open(tmp.path(), "documents", Box::new(AxisEmbedder), 8)
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 4);
        let hits = index.query("cooking", 1, &SearchMode::Similarity).await.unwrap();
        assert_eq!(hits[0].text, "cooking pasta al dente");
        assert!(index.contains_source("/data/notes.txt").await.unwrap());
        assert!(!index.contains_source("/data/other.txt").await.unwrap());

        // collections are isolated
        let other = SqliteIndex::open(tmp.path(), "other", Box::new(AxisEmbedder), 8)
            .await
            .unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
        assert!(!other.contains_source("/data/notes.txt").await.unwrap());

        index.delete_all().await.unwrap();
        assert!(!index.contains_source("/data/notes.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_index_unchanged() {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(tmp.path(), "documents", Box::new(FailingEmbedder), 8)
            .await
            .unwrap();
        let err = index.add(&corpus()).await.unwrap_err();
        assert_eq!(err.kind(), "backend_unavailable");
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_index_mmr_diversifies() {
        let index = MemoryIndex::new("documents", Box::new(AxisEmbedder));
        index
            .add(&[
                chunk("rust", 0),
                chunk("rust rust", 1),
                chunk("rust python", 2),
            ])
            .await
            .unwrap();

        let plain = index.query("rust", 2, &SearchMode::Similarity).await.unwrap();
        let plain_ids: Vec<usize> = plain.iter().map(|h| h.metadata.chunk_index).collect();
        assert_eq!(plain_ids, vec![0, 1]);

        let mmr = SearchMode::Mmr {
            lambda: 0.3,
            fetch_k: 4,
        };
        let diverse = index.query("rust", 2, &mmr).await.unwrap();
        let diverse_ids: Vec<usize> = diverse.iter().map(|h| h.metadata.chunk_index).collect();
        assert_eq!(diverse_ids, vec![0, 2]);

        assert!(index.contains_source("/data/notes.txt").await.unwrap());
        index.delete_all().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(!index.contains_source("/data/notes.txt").await.unwrap());
    }
}
