//! Integration tests for the session lifecycle.
//!
//! The pipeline runs end to end against deterministic in-process backends:
//! a letter-frequency embedder and a canned answer backend, so no network
//! and no API keys are needed. Tests that need a real pdfium library (PDF
//! extraction) are gated behind the `PDF_TESTS_ENABLED` environment
//! variable and synthesise their own minimal PDF fixture.
//!
//! Run the gated tests with:
//!   PDF_TESTS_ENABLED=1 cargo test --test session -- --nocapture

use async_trait::async_trait;
use paperqa::{
    new_session_id, AnswerBackend, EmbeddingBackend, PaperQaError, SessionConfig,
    SessionController, TOP_K,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

// ── Test backends ────────────────────────────────────────────────────────────

/// Deterministic, fully offline embedder: letter-frequency vector over a-z.
struct LetterFrequencyEmbedder;

#[async_trait]
impl EmbeddingBackend for LetterFrequencyEmbedder {
    fn model(&self) -> &str {
        "letter-frequency-test"
    }

    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, PaperQaError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 26];
                for c in text.chars() {
                    let c = c.to_ascii_lowercase();
                    if c.is_ascii_lowercase() {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Always answers the same thing.
struct CannedBackend(&'static str);

#[async_trait]
impl AnswerBackend for CannedBackend {
    async fn complete(
        &self,
        _messages: &[edgequake_llm::ChatMessage],
        _options: &edgequake_llm::CompletionOptions,
    ) -> Result<String, PaperQaError> {
        Ok(self.0.to_string())
    }
}

fn offline_config(root: &TempDir) -> SessionConfig {
    SessionConfig::builder()
        .storage_root(root.path())
        .embedding_backend(Arc::new(LetterFrequencyEmbedder))
        .answer_backend(Arc::new(CannedBackend("canned answer")))
        .build()
        .unwrap()
}

async fn offline_session(root: &TempDir) -> SessionController {
    SessionController::connect(&offline_config(root), "test-session")
        .await
        .unwrap()
}

// ── Minimal PDF fixtures ─────────────────────────────────────────────────────
//
// Hand-assembled PDFs so the gated extraction tests need no binary fixtures
// in the repository.

/// Assemble numbered objects (bodies without the `N 0 obj`/`endobj` wrapper)
/// into a complete PDF with a valid xref table.
fn build_pdf(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut out: Vec<u8> = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn page_object(parent: u32, contents: u32, resources: &str) -> Vec<u8> {
    format!(
        "<< /Type /Page /Parent {parent} 0 R /MediaBox [0 0 612 792] \
         /Resources << {resources} >> /Contents {contents} 0 R >>"
    )
    .into_bytes()
}

fn text_content(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()).into_bytes()
}

/// Two pages, one line of text each, no images.
fn minimal_two_page_pdf() -> Vec<u8> {
    build_pdf(&[
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 >>".to_vec(),
        page_object(2, 4, "/Font << /F1 7 0 R >>"),
        text_content("alpha beta gamma delta epsilon"),
        page_object(2, 6, "/Font << /F1 7 0 R >>"),
        text_content("zeta eta theta iota kappa"),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    ])
}

/// Three pages of text with one uncompressed 2x2 RGB image on page 1.
fn three_page_pdf_with_figure() -> Vec<u8> {
    let pixels: &[u8] = &[
        255, 0, 0, 0, 255, 0, //
        0, 0, 255, 255, 255, 0,
    ];
    let mut image = format!(
        "<< /Type /XObject /Subtype /Image /Width 2 /Height 2 \
         /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} >>\nstream\n",
        pixels.len()
    )
    .into_bytes();
    image.extend_from_slice(pixels);
    image.extend_from_slice(b"\nendstream");

    build_pdf(&[
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R 5 0 R 7 0 R] /Count 3 >>".to_vec(),
        page_object(2, 4, "/Font << /F1 10 0 R >>"),
        text_content("alpha beta gamma"),
        page_object(2, 6, "/Font << /F1 10 0 R >> /XObject << /Im0 9 0 R >>"),
        {
            let stream = "BT /F1 12 Tf 72 700 Td (delta epsilon) Tj ET \
                          q 100 0 0 100 72 500 cm /Im0 Do Q";
            format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()).into_bytes()
        },
        page_object(2, 8, "/Font << /F1 10 0 R >>"),
        text_content("zeta eta theta"),
        image,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_vec(),
    ])
}

/// Skip this test unless PDF_TESTS_ENABLED is set (needs a pdfium library).
macro_rules! skip_unless_pdfium {
    () => {{
        if std::env::var("PDF_TESTS_ENABLED").is_err() {
            println!("SKIP — set PDF_TESTS_ENABLED=1 to run pdfium-backed tests");
            return;
        }
    }};
}

// ── Offline lifecycle tests ──────────────────────────────────────────────────

#[tokio::test]
async fn non_pdf_upload_is_rejected_and_leaves_state_intact() {
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let result = session.upload(b"not a pdf", "notes.txt").await;
    assert!(matches!(result, Err(PaperQaError::InvalidInput(_))));

    // Nothing was written under pdfs/.
    let pdf_dir = root.path().join("test-session").join("pdfs");
    assert_eq!(std::fs::read_dir(pdf_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn corrupt_pdf_upload_is_an_extraction_error() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let result = session.upload(b"%PDF-1.4 garbage", "broken.pdf").await;
    assert!(matches!(result, Err(PaperQaError::Extraction { .. })));
}

#[tokio::test]
async fn empty_question_is_rejected() {
    let root = TempDir::new().unwrap();
    let session = offline_session(&root).await;

    for q in ["", "   ", "\n\t"] {
        let result = session.ask(q).await;
        assert!(matches!(result, Err(PaperQaError::InvalidInput(_))));
    }
}

#[tokio::test]
async fn ask_before_any_upload_answers_from_empty_context() {
    let root = TempDir::new().unwrap();
    let session = offline_session(&root).await;

    let answer = session.ask("What is in this document?").await.unwrap();
    assert_eq!(answer.text, "canned answer");
    assert!(answer.retrieved.is_empty());
}

#[tokio::test]
async fn votes_accumulate_and_survive_end_session() {
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    // Fabricate a retrieved set by voting on chunks directly.
    let retrieved = vec![
        paperqa::ScoredChunk {
            chunk: paperqa::TextChunk {
                page: 0,
                text: "the cat sat on the mat".into(),
            },
            score: 0.9,
        },
        paperqa::ScoredChunk {
            chunk: paperqa::TextChunk {
                page: 1,
                text: "dogs prefer the sofa".into(),
            },
            score: 0.5,
        },
    ];

    session.vote(&retrieved, "where do cats sit?", 1).await.unwrap();
    session.vote(&retrieved[..1], "where do cats sit?", -1).await.unwrap();

    let scores = session.feedback_scores().await.unwrap();
    assert_eq!(scores.len(), 2);
    let cat_id = retrieved[0].chunk.reference_id();
    let dog_id = retrieved[1].chunk.reference_id();
    assert!((scores[&cat_id] - 0.0).abs() < 1e-9); // +1 and -1 average to 0
    assert!((scores[&dog_id] - 1.0).abs() < 1e-9);

    session.end_session().await.unwrap();
    let scores_after = session.feedback_scores().await.unwrap();
    assert_eq!(scores_after.len(), 2);
}

#[tokio::test]
async fn invalid_vote_value_is_rejected() {
    let root = TempDir::new().unwrap();
    let session = offline_session(&root).await;

    let retrieved = vec![paperqa::ScoredChunk {
        chunk: paperqa::TextChunk {
            page: 0,
            text: "text".into(),
        },
        score: 1.0,
    }];
    let result = session.vote(&retrieved, "q", 0).await;
    assert!(matches!(result, Err(PaperQaError::InvalidInput(_))));
}

#[tokio::test]
async fn end_session_resets_the_index_but_keeps_the_session_usable() {
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    session.end_session().await.unwrap();

    // Still answers, from empty context.
    let answer = session.ask("anything left?").await.unwrap();
    assert!(answer.retrieved.is_empty());
    assert_eq!(answer.text, "canned answer");

    // Directory tree was recreated.
    for sub in ["pdfs", "figures", "db"] {
        assert!(root.path().join("test-session").join(sub).is_dir());
    }
}

#[tokio::test]
async fn sessions_are_isolated_but_share_feedback() {
    let root = TempDir::new().unwrap();
    let config = offline_config(&root);

    let a = SessionController::connect(&config, "session-a").await.unwrap();
    let b = SessionController::connect(&config, "session-b").await.unwrap();
    assert_ne!(a.session_id(), b.session_id());

    let retrieved = vec![paperqa::ScoredChunk {
        chunk: paperqa::TextChunk {
            page: 0,
            text: "shared knowledge".into(),
        },
        score: 1.0,
    }];
    a.vote(&retrieved, "q", 1).await.unwrap();

    // Feedback recorded in session A is visible from session B.
    let scores = b.feedback_scores().await.unwrap();
    assert_eq!(scores.len(), 1);
}

#[tokio::test]
async fn missing_keys_fail_at_connect_not_first_use() {
    let root = TempDir::new().unwrap();
    // No injected backends and no API key: connect must fail eagerly.
    let config = SessionConfig::builder()
        .storage_root(root.path())
        .api_key("") // empty is treated as unset by the key chain
        .build()
        .unwrap();

    // Only run the assertion when the environment can't satisfy the chain.
    if std::env::var("OPENAI_API_KEY").is_ok()
        || std::env::var("PAPERQA_EMBEDDINGS_API_KEY").is_ok()
    {
        println!("SKIP — API keys present in environment");
        return;
    }
    let result = SessionController::connect(&config, "no-keys").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn generated_session_ids_are_fresh() {
    assert_ne!(new_session_id(), new_session_id());
}

// ── Pdfium-backed end-to-end tests ───────────────────────────────────────────

#[tokio::test]
async fn upload_then_ask_round_trip() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let pdf = minimal_two_page_pdf();
    let report = session.upload(&pdf, "fixture.pdf").await.unwrap();
    assert_eq!(report.pages, 2);
    assert_eq!(report.skipped_images, 0);

    // Page 0 carries the greek-letter words; the query shares its alphabet.
    let answer = session.ask("alpha beta gamma").await.unwrap();
    assert_eq!(answer.text, "canned answer");
    assert!(!answer.retrieved.is_empty());
    assert!(answer.retrieved.len() <= TOP_K);
    assert_eq!(answer.retrieved[0].chunk.page, 0);

    // The upload landed under the session's pdfs directory.
    let stored: Vec<PathBuf> = std::fs::read_dir(root.path().join("test-session/pdfs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].ends_with("fixture.pdf"));
}

#[tokio::test]
async fn figure_on_page_one_is_extracted_and_named_for_it() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let report = session
        .upload(&three_page_pdf_with_figure(), "figured.pdf")
        .await
        .unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.figures, 1);
    assert_eq!(report.skipped_images, 0);

    let figure = &session.figures()[0];
    assert_eq!((figure.page, figure.index), (1, 0));
    assert!(figure.path.ends_with("fig_page1_0.png"));
    assert!(figure.path.is_file());
}

#[tokio::test]
async fn text_only_pdf_yields_no_figures() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let report = session
        .upload(&minimal_two_page_pdf(), "plain.pdf")
        .await
        .unwrap();
    assert_eq!(report.figures, 0);
    assert!(session.figures().is_empty());
}

#[tokio::test]
async fn duplicate_upload_doubles_the_index() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    let pdf = minimal_two_page_pdf();
    session.upload(&pdf, "fixture.pdf").await.unwrap();
    session.upload(&pdf, "fixture.pdf").await.unwrap();

    // Both copies are retrievable; TOP_K caps the result.
    let answer = session.ask("alpha beta gamma").await.unwrap();
    assert_eq!(answer.retrieved.len(), 4.min(TOP_K));
}

#[tokio::test]
async fn end_session_clears_retrieval() {
    skip_unless_pdfium!();
    let root = TempDir::new().unwrap();
    let mut session = offline_session(&root).await;

    session
        .upload(&minimal_two_page_pdf(), "fixture.pdf")
        .await
        .unwrap();
    session.end_session().await.unwrap();

    let answer = session.ask("alpha beta gamma").await.unwrap();
    assert!(answer.retrieved.is_empty());
}
