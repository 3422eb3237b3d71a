//! Process-wide feedback store.
//!
//! Votes live outside the per-session tree, at `{storage_root}/feedback.db`,
//! so they survive session teardown. The table is append-only: repeated votes
//! from the same user on the same chunk are separate rows, and scores are the
//! running mean per chunk.

use crate::error::PaperQaError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

/// Append-only vote log keyed by chunk reference id.
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    /// Open (or create) the feedback database at `{storage_root}/feedback.db`.
    pub async fn open(storage_root: &Path) -> Result<Self, PaperQaError> {
        tokio::fs::create_dir_all(storage_root)
            .await
            .map_err(|e| PaperQaError::io(storage_root, e))?;
        Self::with_path(&storage_root.join("feedback.db")).await
    }

    /// Open (or create) a feedback database at an explicit path.
    pub async fn with_path(path: &Path) -> Result<Self, PaperQaError> {
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
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL,
                question TEXT NOT NULL,
                feedback INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(PaperQaError::storage)?;

        Ok(Self { pool })
    }

    /// Record one vote for a chunk: `1` (helpful) or `-1` (unhelpful).
    ///
    /// # Errors
    /// [`PaperQaError::InvalidInput`] for any other vote value.
    pub async fn record(
        &self,
        reference_id: &str,
        question: &str,
        vote: i32,
    ) -> Result<(), PaperQaError> {
        if vote != 1 && vote != -1 {
            return Err(PaperQaError::InvalidInput(format!(
                "vote must be 1 or -1, got {vote}"
            )));
        }
        sqlx::query("INSERT INTO feedback (chunk_id, question, feedback) VALUES (?, ?, ?)")
            .bind(reference_id)
            .bind(question)
            .bind(vote as i64)
            .execute(&self.pool)
            .await
            .map_err(PaperQaError::storage)?;
        Ok(())
    }

    /// Mean vote per chunk, over all recorded votes.
    pub async fn scores(&self) -> Result<HashMap<String, f64>, PaperQaError> {
        let rows = sqlx::query(
            "SELECT chunk_id, AVG(feedback) AS score FROM feedback GROUP BY chunk_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(PaperQaError::storage)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let chunk_id: String = row.get("chunk_id");
                let score: f64 = row.get("score");
                (chunk_id, score)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> FeedbackStore {
        FeedbackStore::with_path(&dir.path().join("feedback.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn scores_are_the_mean_per_chunk() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.record("abc123", "what is X?", 1).await.unwrap();
        store.record("abc123", "what is Y?", 1).await.unwrap();
        store.record("abc123", "what is Z?", -1).await.unwrap();
        store.record("def456", "what is X?", -1).await.unwrap();

        let scores = store.scores().await.unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores["abc123"] - 1.0 / 3.0).abs() < 1e-9);
        assert!((scores["def456"] + 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_votes_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        for bad in [0, 2, -2, 100] {
            let result = store.record("abc", "q", bad).await;
            assert!(matches!(result, Err(PaperQaError::InvalidInput(_))));
        }
        assert!(store.scores().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn votes_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feedback.db");

        let store = FeedbackStore::with_path(&path).await.unwrap();
        store.record("abc", "q", 1).await.unwrap();
        drop(store);

        let reopened = FeedbackStore::with_path(&path).await.unwrap();
        let scores = reopened.scores().await.unwrap();
        assert_eq!(scores["abc"], 1.0);
    }
}
