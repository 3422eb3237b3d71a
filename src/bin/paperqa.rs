//! CLI binary for paperqa.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SessionConfig`, drives the session lifecycle, and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use paperqa::{new_session_id, SessionConfig, SessionController};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start a session, index a paper, ask about it
  paperqa upload paper.pdf
  paperqa ask "What does Figure 2 show?"

  # Mark the answer's sources helpful / unhelpful
  paperqa ask --vote up "What dataset was used?"
  paperqa ask --vote down "What is the runtime?"

  # Inspect accumulated feedback
  paperqa scores

  # Tear down the session's documents and index (feedback survives)
  paperqa end

  # Several independent sessions under one storage root
  paperqa --session alice upload a.pdf
  paperqa --session bob upload b.pdf

  # Fully local: Ollama for both embeddings and generation
  paperqa --provider ollama --model llama3.2-vision \
          --embedding-base-url http://localhost:11434/v1 \
          --embedding-model nomic-embed-text \
          ask "Summarise the conclusion"

ENVIRONMENT:
  OPENAI_API_KEY               default key for embeddings and generation
  PAPERQA_EMBEDDINGS_API_KEY   separate key for the embeddings endpoint
  PAPERQA_STORAGE_ROOT         storage root (default ./paperqa_data)
  PAPERQA_SESSION              session id (default "default")

The session id names a directory under the storage root; reuse the same id
across invocations to keep asking about previously uploaded documents.
"#;

/// Ask questions about scientific PDFs, figures included.
#[derive(Parser, Debug)]
#[command(
    name = "paperqa",
    version,
    about = "Ask questions about scientific PDFs, figures included",
    long_about = "Multimodal question answering over scientific PDFs. Uploads are split into \
per-page passages and extracted figures; questions retrieve the most relevant passages by \
embedding similarity and a vision LLM answers with the figures attached. Supports OpenAI, \
Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint (Ollama, vLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Session id. Reuse the same id to keep a document set across runs.
    #[arg(long, env = "PAPERQA_SESSION", default_value = "default", global = true)]
    session: String,

    /// Root directory for documents, figures, indexes, and feedback.
    #[arg(long, env = "PAPERQA_STORAGE_ROOT", default_value = "./paperqa_data", global = true)]
    storage_root: PathBuf,

    /// Generation provider: openai, anthropic, gemini, ollama, azure.
    /// Auto-detected from API key env vars if not set.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", global = true)]
    provider: Option<String>,

    /// Generation model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL", global = true)]
    model: Option<String>,

    /// Embedding model served by the embeddings endpoint.
    #[arg(long, env = "PAPERQA_EMBEDDING_MODEL", default_value = "text-embedding-3-small", global = true)]
    embedding_model: String,

    /// Base URL of an OpenAI-compatible embeddings endpoint.
    #[arg(long, env = "PAPERQA_EMBEDDING_BASE_URL", default_value = "https://api.openai.com/v1", global = true)]
    embedding_base_url: String,

    /// Sampling temperature for answers (0.0–2.0).
    #[arg(long, env = "PAPERQA_TEMPERATURE", default_value_t = 0.2, global = true)]
    temperature: f32,

    /// Maximum tokens per answer.
    #[arg(long, env = "PAPERQA_MAX_TOKENS", default_value_t = 1024, global = true)]
    max_tokens: usize,

    /// Enable debug logging to stderr.
    #[arg(short, long, env = "PAPERQA_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all logging except errors.
    #[arg(short, long, env = "PAPERQA_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a PDF into the session's index.
    Upload {
        /// Path to the PDF file.
        file: PathBuf,
    },
    /// Ask a question about the session's documents.
    Ask {
        /// The question.
        question: String,

        /// Vote on the answer's retrieved passages: up or down.
        #[arg(long, value_parser = ["up", "down"])]
        vote: Option<String>,

        /// Emit the answer and retrieved passages as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show mean feedback score per passage, across all sessions.
    Scores {
        /// Emit scores as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete the session's documents, figures, and index.
    End,
    /// Print a freshly generated session id.
    NewSession,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Command::NewSession = cli.command {
        println!("{}", new_session_id());
        return Ok(());
    }

    // Scores only read the feedback database; no backends needed.
    if let Command::Scores { json } = cli.command {
        let store = paperqa::FeedbackStore::open(&cli.storage_root)
            .await
            .context("Failed to open feedback store")?;
        let scores = store.scores().await.context("Failed to read scores")?;
        print_scores(scores, json)?;
        return Ok(());
    }

    let mut builder = SessionConfig::builder()
        .storage_root(&cli.storage_root)
        .embedding_model(&cli.embedding_model)
        .embedding_base_url(&cli.embedding_base_url)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens);
    if let Some(provider) = &cli.provider {
        builder = builder.generation_backend(provider);
    }
    if let Some(model) = &cli.model {
        builder = builder.generation_model(model);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut session = SessionController::connect(&config, &cli.session)
        .await
        .context("Failed to open session")?;

    match cli.command {
        Command::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("'{}' has no usable filename", file.display()))?;

            let report = session
                .upload(&bytes, filename)
                .await
                .context("Upload failed")?;

            println!(
                "Indexed '{}': {} pages, {} figures{}",
                filename,
                report.pages,
                report.figures,
                if report.skipped_images > 0 {
                    format!(" ({} images skipped)", report.skipped_images)
                } else {
                    String::new()
                }
            );
        }

        Command::Ask { question, vote, json } => {
            let answer = session.ask(&question).await.context("Ask failed")?;

            if json {
                let retrieved: Vec<serde_json::Value> = answer
                    .retrieved
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "reference_id": s.chunk.reference_id(),
                            "page": s.chunk.page,
                            "score": s.score,
                            "text": s.chunk.text,
                        })
                    })
                    .collect();
                let out = serde_json::json!({
                    "answer": answer.text,
                    "retrieved": retrieved,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", answer.text);
                if !answer.retrieved.is_empty() {
                    let mut stderr = io::stderr().lock();
                    writeln!(stderr, "\nSources:")?;
                    for scored in &answer.retrieved {
                        writeln!(
                            stderr,
                            "  page {:>3}  score {:.3}  [{}]",
                            scored.chunk.page + 1,
                            scored.score,
                            scored.chunk.reference_id()
                        )?;
                    }
                }
            }

            if let Some(direction) = vote {
                let value = if direction == "up" { 1 } else { -1 };
                session
                    .vote(&answer.retrieved, &question, value)
                    .await
                    .context("Failed to record vote")?;
            }
        }

        Command::End => {
            session.end_session().await.context("Failed to end session")?;
            println!("Session '{}' ended. Feedback was kept.", cli.session);
        }

        Command::Scores { .. } | Command::NewSession => {
            unreachable!("handled before session connect")
        }
    }

    Ok(())
}

fn print_scores(scores: std::collections::HashMap<String, f64>, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&scores)?);
    } else if scores.is_empty() {
        println!("No feedback recorded yet.");
    } else {
        let mut sorted: Vec<_> = scores.into_iter().collect();
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (reference_id, score) in sorted {
            println!("{reference_id}  {score:+.3}");
        }
    }
    Ok(())
}
