//! ragline: a retrieval-augmented answering pipeline with a
//! confidence-gated workflow and durable run history.
//!
//! The crate has two halves that meet at the retriever:
//!
//! **Retrieval.** Documents are split by the [`chunker`] into overlapping
//! character windows, embedded through an [`adapters::Embedder`], and
//! stored in a [`index::VectorIndex`] (flat, IVF, or HNSW, all cosine over
//! unit vectors). The [`retriever::Retriever`] answers queries against the
//! index and hydrates hits through the [`catalog::DocumentCatalog`].
//!
//! **Workflow.** A [`workflow::Workflow`] walks the fixed graph
//! `RETRIEVE → SUMMARIZE → DECIDE → {ACTION | ESCALATE}`, gating the happy
//! path on generation confidence and appending a checkpoint to a
//! [`checkpoint::CheckpointStore`] after every node. Runs can be
//! inspected, resumed, and rolled back through the store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use ragline::{
//!     Document, DocumentCatalog, Ingestor, InMemoryCheckpointStore, RagConfig,
//!     RespondWithSummary, Retriever, VectorIndex, Workflow,
//! };
//! # use ragline::{Embedder, Generator};
//! # async fn demo(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> miette::Result<()> {
//! let config = RagConfig::builder().top_k(3).build()?;
//! let index = Arc::new(RwLock::new(VectorIndex::new(embedder.dimension(), &config.index)?));
//! let catalog = Arc::new(RwLock::new(DocumentCatalog::new()));
//!
//! let ingestor = Ingestor::new(
//!     Arc::clone(&embedder),
//!     Arc::clone(&index),
//!     Arc::clone(&catalog),
//!     &config,
//! );
//! ingestor.ingest(Document::new("sky", "Sky", "Rayleigh scattering ...")).await?;
//!
//! let retriever = Arc::new(Retriever::new(embedder, index, catalog));
//! let workflow = Workflow::new(
//!     &config,
//!     retriever,
//!     generator,
//!     Arc::new(RespondWithSummary),
//!     Arc::new(InMemoryCheckpointStore::new()),
//! )?;
//!
//! let report = workflow.run("why is the sky blue?").await?;
//! println!("{:?}", report.final_state.action);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod catalog;
pub mod checkpoint;
pub mod chunker;
pub mod config;
pub mod document;
pub mod index;
pub mod ingest;
pub mod retriever;
pub mod telemetry;
pub mod workflow;

pub use adapters::{
    ActionResolver, AdapterErrorKind, Embedder, EmbeddingError, Generation, GenerationError,
    Generator, RespondWithSummary,
};
pub use catalog::{CatalogError, DocumentCatalog};
pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStatus, CheckpointStore, InMemoryCheckpointStore,
    SqliteCheckpointStore,
};
pub use chunker::chunk_document;
pub use config::{ConfigurationError, IndexStrategy, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, Metadata, MetadataFilter, Query, ScoredChunk};
pub use index::{load_index, save_index, IndexError, SearchHit, VectorIndex};
pub use ingest::{IngestError, Ingestor};
pub use retriever::{RetrieveError, Retriever};
pub use workflow::{
    EscalationReason, GraphState, RunReport, Workflow, WorkflowError, WorkflowNode,
    HUMAN_REVIEW_ACTION,
};
