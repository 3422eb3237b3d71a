//! Error types for the paperqa library.
//!
//! One enum covers the whole pipeline. Every failure is scoped to the single
//! user action that triggered it — nothing here is fatal to the process.
//! Upload errors leave previously indexed state intact, a failed ask leaves
//! the index untouched, and a failed vote does not roll back its answer.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the paperqa library.
#[derive(Debug, Error)]
pub enum PaperQaError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// The file could not be opened or parsed as a PDF.
    #[error("Failed to extract '{path}': {detail}\nThe file may be corrupt or not a PDF.")]
    Extraction { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem access failed (unwritable output directory, missing file).
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The generation backend is not configured (missing API key etc.).
    /// Surfaced at session construction, not at first use.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The generation backend was unreachable or returned an error.
    /// Not retried automatically — the caller decides whether to try again.
    #[error("Answer generation failed: {detail}")]
    Generation { detail: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Bad caller input: empty question, non-PDF upload, unreadable figure.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// Corpus index or feedback store access failed, including embedding
    /// calls made on the store's behalf.
    #[error("Storage error: {detail}")]
    Storage { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PaperQaError {
    /// Wrap any storage-layer error (sqlx, embedding endpoint) uniformly.
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        PaperQaError::Storage {
            detail: err.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PaperQaError::Io {
            path: path.into(),
            source,
        }
    }
}
