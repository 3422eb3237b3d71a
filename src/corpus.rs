//! Session-scoped corpus index: SQLite rows with embedded vectors.
//!
//! Vectors are stored as little-endian `f32` BLOBs and compared with
//! brute-force cosine similarity. With one chunk per document page and the
//! single-session workloads this serves, a linear scan over a few hundred
//! rows beats the operational cost of a vector database.

use crate::embed::EmbeddingBackend;
use crate::error::PaperQaError;
use crate::extract::TextChunk;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A retrieved chunk together with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Corpus index for one session.
///
/// Opening the same database twice is idempotent; the schema uses
/// `CREATE TABLE IF NOT EXISTS` and rows accumulate across opens.
pub struct CorpusStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl CorpusStore {
    /// Open (or create) the corpus database for `session_id` under
    /// `storage_root`, at `{root}/{session_id}/db/corpus.db`.
    pub async fn open(
        storage_root: &Path,
        session_id: &str,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self, PaperQaError> {
        let db_dir = storage_root.join(session_id).join("db");
        tokio::fs::create_dir_all(&db_dir)
            .await
            .map_err(|e| PaperQaError::io(&db_dir, e))?;
        Self::with_path(&db_dir.join("corpus.db"), embedder).await
    }

    /// Open (or create) a corpus database at an explicit path.
    pub async fn with_path(
        path: &Path,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Result<Self, PaperQaError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(PaperQaError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS corpus_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                page INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(PaperQaError::storage)?;

        Ok(Self { pool, embedder })
    }

    /// Embed and index a batch of chunks.
    ///
    /// No deduplication: uploading the same document twice doubles its rows.
    pub async fn add(&self, chunks: &[TextChunk]) -> Result<(), PaperQaError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        debug!("Embedded {} chunks with '{}'", chunks.len(), self.embedder.model());

        let mut tx = self.pool.begin().await.map_err(PaperQaError::storage)?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query("INSERT INTO corpus_chunks (page, text, embedding) VALUES (?, ?, ?)")
                .bind(chunk.page as i64)
                .bind(&chunk.text)
                .bind(serialize_embedding(vector))
                .execute(&mut *tx)
                .await
                .map_err(PaperQaError::storage)?;
        }
        tx.commit().await.map_err(PaperQaError::storage)?;
        Ok(())
    }

    /// Number of indexed chunks.
    pub async fn len(&self) -> Result<u64, PaperQaError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM corpus_chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(PaperQaError::storage)?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    /// Retrieve the `k` chunks most similar to `question`, best first.
    ///
    /// An empty store returns an empty result without calling the embedding
    /// backend, so asking questions before any upload costs nothing.
    pub async fn query(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>, PaperQaError> {
        if k == 0 || self.len().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[question])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PaperQaError::storage("embedding backend returned no vector"))?;

        let rows = sqlx::query("SELECT page, text, embedding FROM corpus_chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(PaperQaError::storage)?;

        let mut scored: Vec<ScoredChunk> = rows
            .into_iter()
            .map(|row| {
                let page: i64 = row.get("page");
                let text: String = row.get("text");
                let blob: Vec<u8> = row.get("embedding");
                let embedding = deserialize_embedding(&blob);
                ScoredChunk {
                    chunk: TextChunk {
                        page: page as u32,
                        text,
                    },
                    score: cosine_similarity(&query_vector, &embedding),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Close the connection pool. Required before deleting the database file
    /// on platforms that hold open-file locks.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
