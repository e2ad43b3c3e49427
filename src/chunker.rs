//! Fixed-size sliding-window chunker.
//!
//! Splits a document's text into windows of at most `chunk_size` characters,
//! where consecutive windows share exactly `chunk_overlap` characters:
//! each window after the first starts `chunk_size - chunk_overlap` characters
//! past its predecessor. The final window may be shorter and always reaches
//! the end of the text, so every character is covered by at least one chunk.
//!
//! All arithmetic is over **characters**, not bytes, so multi-byte text
//! chunks cleanly.

use tracing::instrument;

use crate::config::ConfigurationError;
use crate::document::{Chunk, Document};

/// Chunk `document` into overlapping windows.
///
/// Chunk ids are `"{doc_id}#{ordinal}"` with ordinals starting at zero.
/// Every chunk inherits the document's metadata, so metadata filters apply
/// at retrieval time without a join back to the document.
///
/// Returns an empty vector for empty text. Fails only on invalid
/// parameters (`chunk_size == 0` or `chunk_overlap >= chunk_size`).
#[instrument(level = "debug", skip(document), fields(doc_id = %document.id))]
pub fn chunk_document(
    document: &Document,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ConfigurationError> {
    if chunk_size == 0 {
        return Err(ConfigurationError::ZeroChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ConfigurationError::OverlapTooLarge {
            chunk_size,
            overlap: chunk_overlap,
        });
    }

    let chars: Vec<char> = document.text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = (start + chunk_size).min(total);
        let text: String = chars[start..end].iter().collect();
        chunks.push(Chunk {
            chunk_id: format!("{}#{}", document.id, chunks.len()),
            doc_id: document.id.clone(),
            text,
            start_offset: start,
            end_offset: end,
            metadata: document.metadata.clone(),
        });
        if end == total {
            break;
        }
        start = end - chunk_overlap;
    }

    tracing::debug!(chunks = chunks.len(), total_chars = total, "chunked document");
    Ok(chunks)
}
