//! Persona ingestion pipeline
//!
//! Converts an uploaded PDF into bounded plain text and commits it as the
//! owner's persona. Re-ingesting the same bytes is idempotent: the stored
//! text is always a full replace, never a merge.

use lopdf::Document;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::store::PersonaStore;

/// Media types accepted for upload
const PDF_MEDIA_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Character count of the stored persona text
    pub chars: usize,
}

/// Upload-to-persona pipeline.
#[derive(Clone)]
pub struct IngestionPipeline {
    personas: PersonaStore,
    max_pdf_bytes: usize,
}

impl IngestionPipeline {
    pub fn new(personas: PersonaStore, max_pdf_bytes: usize) -> Self {
        Self {
            personas,
            max_pdf_bytes,
        }
    }

    /// Ingest an uploaded document for `owner`.
    ///
    /// Checks run in order: media type, size cap, extraction, emptiness.
    /// Nothing is stored unless every check passes.
    pub async fn ingest(
        &self,
        owner: &str,
        bytes: Vec<u8>,
        declared_content_type: &str,
    ) -> Result<IngestReport> {
        if !PDF_MEDIA_TYPES.contains(&declared_content_type) {
            return Err(Error::UnsupportedMediaType);
        }

        if bytes.len() > self.max_pdf_bytes {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_pdf_bytes,
            });
        }

        // Extraction is CPU-bound; keep it off the request threads
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| Error::Internal(format!("Extraction task failed: {}", e)))??;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::NoExtractableText);
        }

        let text = truncate_chars(text, self.personas.max_chars());
        self.personas.upsert_full(owner, text).await?;

        let chars = text.chars().count();
        info!(owner = %owner, chars, "Persona uploaded");
        Ok(IngestReport { chars })
    }
}

/// Extract plain text from PDF bytes, joining per-page text with newlines.
///
/// A page that yields no text contributes an empty string; per-page failures
/// never abort the document. A document that cannot be parsed at all is
/// treated as having no extractable text.
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            debug!(error = %e, "PDF parse failed");
            return Err(Error::NoExtractableText);
        }
    };

    let pages: Vec<String> = doc
        .get_pages()
        .keys()
        .map(|&page| doc.extract_text(&[page]).unwrap_or_default())
        .collect();

    Ok(pages.join("\n"))
}

/// Keep the first `n` characters of `s`, respecting char boundaries.
fn truncate_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
