//! In-memory catalog mapping chunk ids back to their content.
//!
//! The vector index stores only ids and vectors; the catalog is the side
//! table the retriever consults to hydrate hits into [`ScoredChunk`]s.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::document::{Chunk, Document};

#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum CatalogError {
    #[error("chunk `{chunk_id}` belongs to document `{chunk_doc_id}`, not `{doc_id}`")]
    #[diagnostic(code(ragline::catalog::orphan_chunk))]
    OrphanChunk {
        chunk_id: String,
        chunk_doc_id: String,
        doc_id: String,
    },
}

/// Documents and their chunks, keyed by id.
///
/// Re-registering a document id supersedes the previous registration:
/// the old chunk set is dropped wholesale before the new one is stored.
#[derive(Debug, Default)]
pub struct DocumentCatalog {
    documents: FxHashMap<String, Document>,
    chunks: FxHashMap<String, Chunk>,
    doc_chunks: FxHashMap<String, Vec<String>>,
}

impl DocumentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document together with its chunks, superseding any
    /// previous registration under the same document id. Returns the chunk
    /// ids that were displaced (useful for evicting them from the index).
    pub fn upsert_document(
        &mut self,
        document: Document,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<String>, CatalogError> {
        for chunk in &chunks {
            if chunk.doc_id != document.id {
                return Err(CatalogError::OrphanChunk {
                    chunk_id: chunk.chunk_id.clone(),
                    chunk_doc_id: chunk.doc_id.clone(),
                    doc_id: document.id.clone(),
                });
            }
        }

        let displaced = self.doc_chunks.remove(&document.id).unwrap_or_default();
        for old_id in &displaced {
            self.chunks.remove(old_id);
        }

        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        for chunk in chunks {
            self.chunks.insert(chunk.chunk_id.clone(), chunk);
        }
        self.doc_chunks.insert(document.id.clone(), ids);
        self.documents.insert(document.id.clone(), document);
        Ok(displaced)
    }

    pub fn document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.get(chunk_id)
    }

    pub fn chunk_ids_for(&self, doc_id: &str) -> &[String] {
        self.doc_chunks.get(doc_id).map_or(&[], Vec::as_slice)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
