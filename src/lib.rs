//! # paperqa
//!
//! Multimodal question answering over scientific PDFs.
//!
//! ## Why this crate?
//!
//! Asking an LLM about a paper by pasting its text loses the figures — and
//! in scientific documents the figures often *are* the answer. This crate
//! keeps them: uploads are split into per-page text chunks and extracted
//! figure images, questions retrieve the most relevant pages by embedding
//! similarity, and the answer call attaches both the passages and the
//! figures so a vision model can read charts and diagrams directly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 1. Extract   per-page text + embedded figure PNGs (pdfium, spawn_blocking)
//!  ├─ 2. Index     embed chunks, store vectors in per-session SQLite
//!  │
//! Question
//!  ├─ 3. Retrieve  top-5 chunks by cosine similarity
//!  ├─ 4. Answer    one multimodal chat call: passages + ≤2 figures attached
//!  └─ 5. Vote      optional 👍/👎 per retrieved chunk, persisted across sessions
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperqa::{new_session_id, SessionConfig, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Keys auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = SessionConfig::default();
//!     let session_id = new_session_id();
//!     let mut session = SessionController::connect(&config, &session_id).await?;
//!
//!     let bytes = std::fs::read("paper.pdf")?;
//!     let report = session.upload(&bytes, "paper.pdf").await?;
//!     eprintln!("indexed {} pages, {} figures", report.pages, report.figures);
//!
//!     let answer = session.ask("What does Figure 2 show?").await?;
//!     println!("{}", answer.text);
//!
//!     // The retrieved passages were helpful:
//!     session.vote(&answer.retrieved, "What does Figure 2 show?", 1).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paperqa` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paperqa = { version = "0.3", default-features = false }
//! ```
//!
//! ## Local models
//!
//! Both halves of the pipeline speak OpenAI-compatible wire formats, so a
//! local Ollama / LM Studio / vLLM server works end to end: point
//! `embedding_base_url` at the server for embeddings and name an
//! `edgequake_llm` provider (e.g. `"ollama"`) for generation.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod answer;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use answer::{AnswerBackend, AnswerGenerator, LlmAnswerBackend, MAX_FIGURES};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use corpus::{CorpusStore, ScoredChunk};
pub use embed::{EmbeddingBackend, OpenAiEmbedder};
pub use error::PaperQaError;
pub use extract::{extract_document, Extraction, Figure, TextChunk};
pub use feedback::FeedbackStore;
pub use session::{new_session_id, Answer, SessionController, UploadReport, TOP_K};
