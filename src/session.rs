//! Session lifecycle: upload, ask, vote, end.
//!
//! A session owns its directory tree under the storage root:
//!
//! ```text
//! {storage_root}/
//! ├── feedback.db              # process-wide, survives sessions
//! └── {session_id}/
//!     ├── pdfs/                # uploaded documents, as received
//!     ├── figures/             # extracted figure PNGs
//!     └── db/corpus.db         # embedding index
//! ```
//!
//! Backends are resolved eagerly in [`SessionController::connect`] so a
//! missing API key fails at startup instead of on the first question.

use crate::answer::{resolve_provider, AnswerBackend, AnswerGenerator, LlmAnswerBackend};
use crate::config::SessionConfig;
use crate::corpus::{CorpusStore, ScoredChunk};
use crate::embed::{EmbeddingBackend, OpenAiEmbedder};
use crate::error::PaperQaError;
use crate::extract::{extract_document, parse_figure_filename, Figure};
use crate::feedback::FeedbackStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Retrieval depth per question. Five page-sized chunks fit comfortably in
/// every supported model's context alongside two figures.
pub const TOP_K: usize = 5;

/// What an upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Pages (and therefore chunks) indexed from this document.
    pub pages: usize,
    /// Figures extracted and saved from this document.
    pub figures: usize,
    /// Embedded images skipped because they could not be decoded or saved.
    pub skipped_images: usize,
}

/// An answer together with the passages that grounded it, best match first.
/// Keep the `retrieved` list around to [`SessionController::vote`] on it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub retrieved: Vec<ScoredChunk>,
}

/// One user's working session over one or more uploaded documents.
pub struct SessionController {
    session_id: String,
    storage_root: PathBuf,
    corpus: CorpusStore,
    feedback: FeedbackStore,
    generator: AnswerGenerator,
    embedder: Arc<dyn EmbeddingBackend>,
    /// Figures from the most recent upload, in (page, index) order. After a
    /// process restart this is rebuilt from everything on disk, the closest
    /// available approximation.
    figures: Vec<Figure>,
}

/// Mint a fresh opaque session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionController {
    /// Open (or resume) the session `session_id` under `config.storage_root`.
    ///
    /// Creates the session directory tree, resolves the embedding and
    /// generation backends, opens both stores, and reloads any figures a
    /// previous process extracted for this session.
    ///
    /// # Errors
    /// [`PaperQaError::ProviderNotConfigured`] when no usable API key or
    /// backend can be found for either embeddings or generation.
    pub async fn connect(config: &SessionConfig, session_id: &str) -> Result<Self, PaperQaError> {
        let storage_root = config.storage_root.clone();
        let session_dir = storage_root.join(session_id);
        for sub in ["pdfs", "figures", "db"] {
            let dir = session_dir.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PaperQaError::io(&dir, e))?;
        }

        let embedder = resolve_embedder(config)?;
        let backend: Arc<dyn AnswerBackend> = match &config.answer_backend {
            Some(backend) => Arc::clone(backend),
            None => {
                let provider = resolve_provider(
                    config.generation_backend.as_deref(),
                    config.generation_model.as_deref(),
                )?;
                Arc::new(LlmAnswerBackend::new(provider))
            }
        };
        let generator = AnswerGenerator::new(backend, config.temperature, config.max_tokens);

        let corpus = CorpusStore::open(&storage_root, session_id, Arc::clone(&embedder)).await?;
        let feedback = FeedbackStore::open(&storage_root).await?;
        let figures = load_figures(&session_dir.join("figures")).await?;

        info!(
            "Session {} connected: {} indexed chunks, {} figures on disk",
            session_id,
            corpus.len().await?,
            figures.len()
        );

        Ok(Self {
            session_id: session_id.to_string(),
            storage_root,
            corpus,
            feedback,
            generator,
            embedder,
            figures,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_dir(&self) -> PathBuf {
        self.storage_root.join(&self.session_id)
    }

    /// Store and index an uploaded PDF.
    ///
    /// The raw bytes are written under `pdfs/`, extracted into per-page
    /// chunks and figure PNGs, and the chunks embedded into the corpus.
    /// Re-uploading the same document indexes it again (no deduplication).
    ///
    /// # Errors
    /// [`PaperQaError::InvalidInput`] when `filename` does not end in `.pdf`;
    /// [`PaperQaError::Extraction`] when the bytes are not a readable PDF.
    /// A failed upload leaves previously indexed state intact.
    pub async fn upload(&mut self, bytes: &[u8], filename: &str) -> Result<UploadReport, PaperQaError> {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                PaperQaError::InvalidInput(format!("'{filename}' is not a usable filename"))
            })?;
        let is_pdf = Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(PaperQaError::InvalidInput(format!(
                "'{name}' is not a PDF (expected a .pdf extension)"
            )));
        }

        let pdf_path = self.session_dir().join("pdfs").join(name);
        tokio::fs::write(&pdf_path, bytes)
            .await
            .map_err(|e| PaperQaError::io(&pdf_path, e))?;

        let figure_dir = self.session_dir().join("figures");
        let extraction = extract_document(&pdf_path, &figure_dir).await?;

        self.corpus.add(&extraction.chunks).await?;

        let report = UploadReport {
            pages: extraction.chunks.len(),
            figures: extraction.figures.len(),
            skipped_images: extraction.skipped_images,
        };

        // Later asks attach figures from the latest document only.
        self.figures = extraction.figures;

        info!(
            "Indexed '{}': {} pages, {} figures ({} skipped)",
            name, report.pages, report.figures, report.skipped_images
        );
        Ok(report)
    }

    /// Answer a question from the session's indexed documents.
    ///
    /// Retrieves the [`TOP_K`] most similar chunks and generates one answer
    /// with the latest upload's figures attached (capped by the generator). Asking
    /// before any upload still answers, from an explicitly empty context.
    ///
    /// # Errors
    /// [`PaperQaError::InvalidInput`] when the question is empty or blank.
    pub async fn ask(&self, question: &str) -> Result<Answer, PaperQaError> {
        if question.trim().is_empty() {
            return Err(PaperQaError::InvalidInput(
                "question must not be empty".into(),
            ));
        }

        let retrieved = self.corpus.query(question, TOP_K).await?;
        let text = self
            .generator
            .generate(question, &retrieved, &self.figures)
            .await?;

        Ok(Answer { text, retrieved })
    }

    /// Record a vote (`1` helpful, `-1` unhelpful) against every chunk that
    /// grounded an answer. Votes persist across sessions.
    pub async fn vote(
        &self,
        retrieved: &[ScoredChunk],
        question: &str,
        vote: i32,
    ) -> Result<(), PaperQaError> {
        for scored in retrieved {
            self.feedback
                .record(&scored.chunk.reference_id(), question, vote)
                .await?;
        }
        Ok(())
    }

    /// Mean feedback score per chunk reference id, across all sessions.
    pub async fn feedback_scores(&self) -> Result<HashMap<String, f64>, PaperQaError> {
        self.feedback.scores().await
    }

    /// Figures from the most recent upload, in (page, index) order.
    pub fn figures(&self) -> &[Figure] {
        &self.figures
    }

    /// Tear down the session's documents, figures, and index.
    ///
    /// Feedback is process-wide and survives. The controller stays usable:
    /// the directory tree and an empty corpus are recreated, so subsequent
    /// asks answer from empty context and subsequent uploads start fresh.
    pub async fn end_session(&mut self) -> Result<(), PaperQaError> {
        self.corpus.close().await;

        let session_dir = self.session_dir();
        tokio::fs::remove_dir_all(&session_dir)
            .await
            .map_err(|e| PaperQaError::io(&session_dir, e))?;

        for sub in ["pdfs", "figures", "db"] {
            let dir = session_dir.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PaperQaError::io(&dir, e))?;
        }

        self.corpus = CorpusStore::open(
            &self.storage_root,
            &self.session_id,
            Arc::clone(&self.embedder),
        )
        .await?;
        self.figures.clear();

        info!("Session {} ended and reset", self.session_id);
        Ok(())
    }
}

/// Pick the embedding backend: injected > configured endpoint with a key
/// from the config or environment.
fn resolve_embedder(config: &SessionConfig) -> Result<Arc<dyn EmbeddingBackend>, PaperQaError> {
    if let Some(backend) = &config.embedding_backend {
        return Ok(Arc::clone(backend));
    }

    let key = config
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("PAPERQA_EMBEDDINGS_API_KEY").ok().filter(|k| !k.is_empty()))
        .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
        .ok_or_else(|| PaperQaError::ProviderNotConfigured {
            provider: "embeddings".to_string(),
            hint: "Set PAPERQA_EMBEDDINGS_API_KEY or OPENAI_API_KEY, or inject an \
                   embedding backend via SessionConfig."
                .to_string(),
        })?;

    Ok(Arc::new(OpenAiEmbedder::new(
        key,
        &config.embedding_base_url,
        &config.embedding_model,
    )?))
}

/// Reload the figure set from a session's figures directory.
async fn load_figures(figure_dir: &Path) -> Result<Vec<Figure>, PaperQaError> {
    let mut figures = Vec::new();
    let mut entries = tokio::fs::read_dir(figure_dir)
        .await
        .map_err(|e| PaperQaError::io(figure_dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PaperQaError::io(figure_dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((page, index)) = parse_figure_filename(name) {
            figures.push(Figure {
                path: entry.path(),
                page,
                index,
            });
        }
    }
    figures.sort_by_key(|f| (f.page, f.index));
    Ok(figures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_opaque() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[tokio::test]
    async fn load_figures_orders_by_page_then_index() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["fig_page2_0.png", "fig_page0_1.png", "fig_page0_0.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let figures = load_figures(dir.path()).await.unwrap();
        let order: Vec<(u32, u32)> = figures.iter().map(|f| (f.page, f.index)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (2, 0)]);
    }
}
