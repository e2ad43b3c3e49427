//! Query-side retrieval: embed, search, hydrate, filter.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::adapters::{Embedder, EmbeddingError};
use crate::catalog::DocumentCatalog;
use crate::document::{Query, ScoredChunk};
use crate::index::{IndexError, VectorIndex};

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

impl RetrieveError {
    /// Whether the workflow's retry policy should try again. Index faults
    /// are structural and never retried.
    pub fn retriable(&self) -> bool {
        match self {
            Self::Embedding(e) => e.retriable,
            Self::Index(_) => false,
        }
    }
}

/// Embeds a query, searches the shared index, and hydrates hits through the
/// catalog. The index and catalog sit behind locks so retrieval can run
/// concurrently with other readers; ingestion takes the write side.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<RwLock<VectorIndex>>,
    catalog: Arc<RwLock<DocumentCatalog>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<RwLock<VectorIndex>>,
        catalog: Arc<RwLock<DocumentCatalog>>,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
        }
    }

    /// Run a retrieval request end to end.
    ///
    /// Hits are ordered by descending score (ties by chunk id) and capped
    /// at `query.top_k`. When a metadata filter is present the whole index
    /// is ranked before filtering, so a qualifying chunk is never crowded
    /// out of the candidate pool by non-matching ones.
    #[instrument(level = "debug", skip(self), fields(query = %query.text, top_k = query.top_k))]
    pub async fn retrieve(&self, query: &Query) -> Result<Vec<ScoredChunk>, RetrieveError> {
        let vector = self.embedder.embed(&query.text).await?;

        let hits = {
            let index = self.index.read();
            let fetch = if query.filter.is_some() {
                index.len()
            } else {
                query.top_k
            };
            index.search(&vector, fetch)?
        };

        let catalog = self.catalog.read();
        let mut results = Vec::with_capacity(query.top_k.min(hits.len()));
        for hit in hits {
            if results.len() == query.top_k {
                break;
            }
            let Some(chunk) = catalog.chunk(&hit.chunk_id) else {
                // Index and catalog drifted apart; skip rather than fail
                // the whole query.
                warn!(chunk_id = %hit.chunk_id, "indexed chunk missing from catalog");
                continue;
            };
            if let Some(filter) = &query.filter {
                if !filter.matches(&chunk.metadata) {
                    continue;
                }
            }
            results.push(ScoredChunk {
                chunk_id: hit.chunk_id,
                score: hit.score,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });
        }
        Ok(results)
    }
}
