//! Answer generation: one multimodal chat call over retrieved context.
//!
//! The request carries the question, the retrieved passages as a text
//! context block, and up to [`MAX_FIGURES`] figures as base64 PNG
//! attachments. There is exactly one call per question — generation errors
//! surface to the caller, who decides whether to retry.

use crate::corpus::ScoredChunk;
use crate::error::PaperQaError;
use crate::extract::Figure;
use crate::prompts::{answer_request, ANSWER_SYSTEM_PROMPT, EMPTY_CONTEXT_NOTE};
use async_trait::async_trait;
use base64::Engine;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Most figures attached to a single request. Vision context windows are
/// the binding constraint; two images cover the common "figure + table"
/// case without blowing the token budget.
pub const MAX_FIGURES: usize = 2;

/// Seam between answer assembly and the actual model call, so tests can
/// inject a canned backend.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, PaperQaError>;
}

/// Production backend: any `edgequake_llm` provider.
pub struct LlmAnswerBackend {
    provider: Arc<dyn LLMProvider>,
}

impl LlmAnswerBackend {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AnswerBackend for LlmAnswerBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, PaperQaError> {
        let response = self
            .provider
            .chat(messages, Some(options))
            .await
            .map_err(|e| PaperQaError::Generation {
                detail: e.to_string(),
            })?;
        Ok(response.content)
    }
}

/// Assembles requests and produces answers.
pub struct AnswerGenerator {
    backend: Arc<dyn AnswerBackend>,
    temperature: f32,
    max_tokens: usize,
}

impl AnswerGenerator {
    pub fn new(backend: Arc<dyn AnswerBackend>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            backend,
            temperature,
            max_tokens,
        }
    }

    /// Answer `question` from the retrieved `chunks` and session `figures`.
    ///
    /// At most [`MAX_FIGURES`] figures are attached, in extraction order.
    /// Empty retrieval is not an error: the model is told explicitly that no
    /// passages were found and answers (or declines) on that basis.
    pub async fn generate(
        &self,
        question: &str,
        chunks: &[ScoredChunk],
        figures: &[Figure],
    ) -> Result<String, PaperQaError> {
        let context = build_context(chunks);
        let images = load_figure_images(figures).await?;
        debug!(
            "Generating answer: {} context chunks, {} figures attached",
            chunks.len(),
            images.len()
        );

        let prompt = answer_request(question, &context);
        let messages = vec![
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user_with_images(prompt.as_str(), images),
        ];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        self.backend.complete(&messages, &options).await
    }
}

/// Join retrieved passages into the context block, best match first.
fn build_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return EMPTY_CONTEXT_NOTE.to_string();
    }
    chunks
        .iter()
        .map(|s| s.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Read and encode up to [`MAX_FIGURES`] figure files as PNG attachments.
async fn load_figure_images(figures: &[Figure]) -> Result<Vec<ImageData>, PaperQaError> {
    let mut images = Vec::new();
    for figure in figures.iter().take(MAX_FIGURES) {
        let bytes = tokio::fs::read(&figure.path).await.map_err(|e| {
            PaperQaError::InvalidInput(format!(
                "figure '{}' is unreadable: {e}",
                figure.path.display()
            ))
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        images.push(ImageData::new(encoded, "image/png"));
    }
    Ok(images)
}

/// Instantiate a named provider with the given model.
fn create_answer_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PaperQaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PaperQaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve a generation provider, most-specific first:
///
/// 1. Named provider (+ optional model) from the config.
/// 2. `OPENAI_API_KEY` present — prefer OpenAI so users holding several
///    provider keys get a predictable default.
/// 3. Full auto-detection via [`ProviderFactory::from_env`].
pub fn resolve_provider(
    backend: Option<&str>,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, PaperQaError> {
    if let Some(name) = backend {
        let model = model.unwrap_or("gpt-4.1-nano");
        return create_answer_provider(name, model);
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = model.unwrap_or("gpt-4.1-nano");
            return create_answer_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PaperQaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
