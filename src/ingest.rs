//! Offline ingestion: chunk a document, embed each chunk, index the
//! vectors, and register the content in the catalog.

use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, instrument};

use crate::adapters::{Embedder, EmbeddingError};
use crate::catalog::{CatalogError, DocumentCatalog};
use crate::chunker::chunk_document;
use crate::config::{ConfigurationError, RagConfig};
use crate::document::Document;
use crate::index::{IndexError, VectorIndex};

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),
}

/// Write-side counterpart to [`crate::retriever::Retriever`]: pushes
/// documents through chunking and embedding into the shared index/catalog.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<RwLock<VectorIndex>>,
    catalog: Arc<RwLock<DocumentCatalog>>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<RwLock<VectorIndex>>,
        catalog: Arc<RwLock<DocumentCatalog>>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Ingest one document and return the number of chunks indexed.
    ///
    /// Re-ingesting a document id supersedes its previous chunks: displaced
    /// chunk ids are evicted from the index where the strategy supports
    /// removal, and surviving ids are overwritten in place. Embedding runs
    /// before any lock is taken, so a slow provider does not block readers.
    #[instrument(level = "info", skip(self, document), fields(doc_id = %document.id))]
    pub async fn ingest(&self, document: Document) -> Result<usize, IngestError> {
        let chunks = chunk_document(&document, self.chunk_size, self.chunk_overlap)?;

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = self.embedder.embed(&chunk.text).await?;
            embedded.push(vector);
        }

        let count = chunks.len();
        let new_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();

        let mut catalog = self.catalog.write();
        let mut index = self.index.write();
        let displaced = catalog.upsert_document(document, chunks)?;
        for old_id in &displaced {
            if new_ids.contains(old_id) {
                continue;
            }
            // HNSW cannot remove; the stale entry stays indexed but is
            // dropped at hydration time since the catalog no longer has it.
            let _ = index.remove(old_id);
        }
        for (id, vector) in new_ids.iter().zip(&embedded) {
            index.insert_or_replace(id, vector)?;
        }

        info!(chunks = count, displaced = displaced.len(), "ingested document");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexStrategy;
    use async_trait::async_trait;

    /// Deterministic toy embedder: hashes characters into buckets.
    struct BucketEmbedder;

    #[async_trait]
    impl Embedder for BucketEmbedder {
        fn dimension(&self) -> usize {
            8
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0f32; 8];
            for (i, ch) in text.chars().enumerate() {
                v[(ch as usize + i) % 8] += 1.0;
            }
            if v.iter().all(|&x| x == 0.0) {
                v[0] = 1.0;
            }
            Ok(v)
        }
    }

    fn pipeline() -> (Ingestor, Arc<RwLock<VectorIndex>>, Arc<RwLock<DocumentCatalog>>) {
        let config = RagConfig::builder()
            .chunk_size(16)
            .chunk_overlap(4)
            .build()
            .unwrap();
        let index = Arc::new(RwLock::new(
            VectorIndex::new(8, &IndexStrategy::Flat).unwrap(),
        ));
        let catalog = Arc::new(RwLock::new(DocumentCatalog::new()));
        let ingestor = Ingestor::new(
            Arc::new(BucketEmbedder),
            Arc::clone(&index),
            Arc::clone(&catalog),
            &config,
        );
        (ingestor, index, catalog)
    }

    #[tokio::test]
    async fn ingest_populates_index_and_catalog() {
        let (ingestor, index, catalog) = pipeline();
        let count = ingestor
            .ingest(Document::new("d1", "t", "the quick brown fox jumps over"))
            .await
            .unwrap();
        assert!(count > 1);
        assert_eq!(index.read().len(), count);
        assert_eq!(catalog.read().chunk_count(), count);
    }

    #[tokio::test]
    async fn reingest_supersedes_old_chunks() {
        let (ingestor, index, catalog) = pipeline();
        ingestor
            .ingest(Document::new("d1", "t", "a much longer body of text than before"))
            .await
            .unwrap();
        let count = ingestor
            .ingest(Document::new("d1", "t", "short now"))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(index.read().len(), 1);
        assert_eq!(catalog.read().chunk_count(), 1);
    }
}
