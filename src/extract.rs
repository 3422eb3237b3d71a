//! Document extraction: per-page text chunks and embedded figures via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking thread pool
//! so Tokio worker threads never stall on CPU-heavy PDF parsing.
//!
//! ## Partial-failure policy
//!
//! A single unreadable or unsaveable embedded image does not abort the
//! document: it is logged via `warn!` and counted in
//! [`Extraction::skipped_images`], and extraction continues. Only an
//! unopenable PDF is fatal.

use crate::error::PaperQaError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One page's worth of extracted text. Pages are never split further;
/// retrieval granularity is the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// 0-based page number within the source document.
    pub page: u32,
    pub text: String,
}

impl TextChunk {
    /// Stable, content-derived identifier used to key feedback votes.
    ///
    /// A hash of the text (not the page number) so that re-extracting a
    /// document with different chunking granularity cannot silently
    /// misattribute historical feedback.
    pub fn reference_id(&self) -> String {
        let digest = Sha256::digest(self.text.as_bytes());
        hex::encode(&digest[..8])
    }
}

/// A figure saved to disk during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Figure {
    pub path: PathBuf,
    /// 0-based page the image was embedded on.
    pub page: u32,
    /// 0-based encounter order within that page.
    pub index: u32,
}

/// Result of extracting one document.
#[derive(Debug)]
pub struct Extraction {
    /// Exactly one chunk per page, in page order.
    pub chunks: Vec<TextChunk>,
    /// Figures in encounter order: page order, then within-page order.
    pub figures: Vec<Figure>,
    /// Embedded images that could not be decoded or saved and were skipped.
    pub skipped_images: usize,
}

/// Filename for a saved figure, encoding page and in-page index.
///
/// Repeated extraction runs only overwrite when the same page/index pair
/// recurs for the same output directory.
pub fn figure_filename(page: u32, index: u32) -> String {
    format!("fig_page{page}_{index}.png")
}

/// Parse a figure filename back into its (page, index) pair.
///
/// Used to reload a session's figure set from disk after a restart.
pub fn parse_figure_filename(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("fig_page")?.strip_suffix(".png")?;
    let (page, index) = rest.split_once('_')?;
    Some((page.parse().ok()?, index.parse().ok()?))
}

/// Extract per-page text and embedded figures from a PDF.
///
/// Creates `figure_dir` if absent. Runs pdfium inside `spawn_blocking`.
///
/// # Errors
/// * [`PaperQaError::Extraction`] — the file is not a readable PDF.
/// * [`PaperQaError::Io`] — `figure_dir` cannot be created or written.
pub async fn extract_document(
    pdf_path: &Path,
    figure_dir: &Path,
) -> Result<Extraction, PaperQaError> {
    tokio::fs::create_dir_all(figure_dir)
        .await
        .map_err(|e| PaperQaError::io(figure_dir, e))?;

    let pdf = pdf_path.to_path_buf();
    let out = figure_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&pdf, &out))
        .await
        .map_err(|e| PaperQaError::Extraction {
            path: pdf_path.to_path_buf(),
            detail: format!("extraction task panicked: {e}"),
        })?
}

/// Blocking implementation of document extraction.
fn extract_blocking(pdf_path: &Path, figure_dir: &Path) -> Result<Extraction, PaperQaError> {
    let pdfium = Pdfium::default();

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| PaperQaError::Extraction {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut chunks = Vec::with_capacity(pages.len() as usize);
    let mut figures = Vec::new();
    let mut skipped_images = 0usize;

    for (page_index, page) in pages.iter().enumerate() {
        let page_num = page_index as u32;

        // A page without a text layer yields an empty chunk rather than a
        // missing one: callers rely on exactly N chunks for N pages.
        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("Page {}: text extraction failed ({e:?}), using empty text", page_num);
                String::new()
            }
        };
        chunks.push(TextChunk {
            page: page_num,
            text,
        });

        let mut image_index = 0u32;
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };

            match image_object.get_raw_image() {
                Ok(raw) => {
                    let normalized = normalize_pixels(raw);
                    let path = figure_dir.join(figure_filename(page_num, image_index));
                    match normalized.save_with_format(&path, image::ImageFormat::Png) {
                        Ok(()) => {
                            debug!("Saved figure {}", path.display());
                            figures.push(Figure {
                                path,
                                page: page_num,
                                index: image_index,
                            });
                        }
                        Err(e) => {
                            warn!("Page {}: failed to save image {}: {e}", page_num, image_index);
                            skipped_images += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Page {}: failed to decode image {}: {e:?}", page_num, image_index);
                    skipped_images += 1;
                }
            }
            image_index += 1;
        }
    }

    info!(
        "Extracted {} chunks, {} figures ({} images skipped)",
        chunks.len(),
        figures.len(),
        skipped_images
    );

    Ok(Extraction {
        chunks,
        figures,
        skipped_images,
    })
}

/// Normalise exotic pixel formats to something PNG encodes cleanly.
///
/// pdfium can hand back high-bit-depth or float imagery; anything that is
/// not plain 8-bit gray/RGB/RGBA is flattened to RGB8 so the saved figure
/// renders everywhere downstream.
fn normalize_pixels(img: DynamicImage) -> DynamicImage {
    use image::ColorType::*;
    match img.color() {
        L8 | La8 | Rgb8 | Rgba8 => img,
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage, Rgba, RgbaImage};

    #[test]
    fn figure_filename_round_trips() {
        assert_eq!(figure_filename(1, 0), "fig_page1_0.png");
        assert_eq!(parse_figure_filename("fig_page1_0.png"), Some((1, 0)));
        assert_eq!(parse_figure_filename("fig_page12_34.png"), Some((12, 34)));
        assert_eq!(parse_figure_filename("notes.png"), None);
        assert_eq!(parse_figure_filename("fig_page1_x.png"), None);
    }

    #[test]
    fn reference_id_is_deterministic_and_content_derived() {
        let a = TextChunk {
            page: 0,
            text: "attention is all you need".into(),
        };
        let b = TextChunk {
            page: 7,
            text: "attention is all you need".into(),
        };
        let c = TextChunk {
            page: 0,
            text: "different text".into(),
        };
        // Same text, different page → same id. Page is not part of identity.
        assert_eq!(a.reference_id(), b.reference_id());
        assert_ne!(a.reference_id(), c.reference_id());
        assert_eq!(a.reference_id().len(), 16);
    }

    #[test]
    fn normalize_keeps_plain_rgba() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
        let out = normalize_pixels(img);
        assert_eq!(out.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn normalize_flattens_float_pixels_to_rgb8() {
        let img = DynamicImage::ImageRgb32F(Rgb32FImage::from_pixel(4, 4, Rgb([0.5, 0.5, 0.5])));
        let out = normalize_pixels(img);
        assert_eq!(out.color(), image::ColorType::Rgb8);
    }
}
