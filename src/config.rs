//! Configuration for a question-answering session.
//!
//! Everything that used to be ambient in deployments of this kind — API keys,
//! fixed model names, storage paths — lives in one explicit [`SessionConfig`]
//! passed into [`crate::session::SessionController`] at construction. Keeping
//! every knob in one struct makes it trivial to share configs, log them, and
//! diff two runs to understand why their answers differ.
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::answer::AnswerBackend;
use crate::embed::EmbeddingBackend;
use crate::error::PaperQaError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for one deployment of the pipeline.
///
/// Built via [`SessionConfig::builder()`] or [`SessionConfig::default()`].
///
/// # Example
/// ```rust
/// use paperqa::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .storage_root("/var/lib/paperqa")
///     .generation_backend("openai")
///     .generation_model("gpt-4o-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Root directory for all persistent state. Each session owns
    /// `{root}/{session_id}/{pdfs,figures,db}`; the process-wide feedback
    /// database lives at `{root}/feedback.db`. Default: `./paperqa_data`.
    pub storage_root: PathBuf,

    /// Embedding model identifier. Fixed per deployment — the same model
    /// must embed both indexed chunks and incoming questions, or similarity
    /// scores are meaningless. Default: `text-embedding-3-small`.
    pub embedding_model: String,

    /// Base URL of an OpenAI-compatible embeddings endpoint. Point this at
    /// a local server (Ollama, LM Studio, vLLM) for the local-model variant.
    /// Default: `https://api.openai.com/v1`.
    pub embedding_base_url: String,

    /// Generation provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, the provider is auto-detected from API key env vars.
    pub generation_backend: Option<String>,

    /// Generation model identifier. If None, uses the provider default.
    pub generation_model: Option<String>,

    /// API key for the embeddings endpoint. If None, read from
    /// `PAPERQA_EMBEDDINGS_API_KEY` then `OPENAI_API_KEY`. Generation keys
    /// are always read from the provider's own env var.
    pub api_key: Option<String>,

    /// Sampling temperature for answer generation. Default: 0.2.
    ///
    /// Low temperature keeps answers grounded in the retrieved passages
    /// rather than the model's imagination.
    pub temperature: f32,

    /// Maximum tokens the model may generate per answer. Default: 1024.
    pub max_tokens: usize,

    /// Pre-constructed answer backend. Takes precedence over
    /// `generation_backend`; used by tests and callers that need custom
    /// middleware around the LLM call.
    pub answer_backend: Option<Arc<dyn AnswerBackend>>,

    /// Pre-constructed embedding backend. Takes precedence over
    /// `embedding_model`/`embedding_base_url`.
    pub embedding_backend: Option<Arc<dyn EmbeddingBackend>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./paperqa_data"),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            generation_backend: None,
            generation_model: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 1024,
            answer_backend: None,
            embedding_backend: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("storage_root", &self.storage_root)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_base_url", &self.embedding_base_url)
            .field("generation_backend", &self.generation_backend)
            .field("generation_model", &self.generation_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "answer_backend",
                &self.answer_backend.as_ref().map(|_| "<dyn AnswerBackend>"),
            )
            .field(
                "embedding_backend",
                &self
                    .embedding_backend
                    .as_ref()
                    .map(|_| "<dyn EmbeddingBackend>"),
            )
            .finish()
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    pub fn embedding_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.embedding_base_url = url.into();
        self
    }

    pub fn generation_backend(mut self, name: impl Into<String>) -> Self {
        self.config.generation_backend = Some(name.into());
        self
    }

    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.config.generation_model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n.max(1);
        self
    }

    pub fn answer_backend(mut self, backend: Arc<dyn AnswerBackend>) -> Self {
        self.config.answer_backend = Some(backend);
        self
    }

    pub fn embedding_backend(mut self, backend: Arc<dyn EmbeddingBackend>) -> Self {
        self.config.embedding_backend = Some(backend);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, PaperQaError> {
        let c = &self.config;
        if c.storage_root.as_os_str().is_empty() {
            return Err(PaperQaError::InvalidConfig(
                "storage_root must not be empty".into(),
            ));
        }
        if c.embedding_model.trim().is_empty() && c.embedding_backend.is_none() {
            return Err(PaperQaError::InvalidConfig(
                "embedding_model must not be empty".into(),
            ));
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(PaperQaError::InvalidConfig(format!(
                "temperature must be 0.0–2.0, got {}",
                c.temperature
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = SessionConfig::builder().build().unwrap();
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.max_tokens, 1024);
        assert!(config.generation_backend.is_none());
    }

    #[test]
    fn temperature_is_clamped() {
        let config = SessionConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn empty_storage_root_rejected() {
        let result = SessionConfig::builder().storage_root("").build();
        assert!(matches!(result, Err(PaperQaError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = SessionConfig::builder().api_key("sk-secret").build().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
