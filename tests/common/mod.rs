//! Shared fixtures: deterministic adapters and a pre-ingested pipeline.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use ragline::{
    ActionResolver, CheckpointStore, Document, DocumentCatalog, Embedder, EmbeddingError,
    Generation, GenerationError, Generator, Ingestor, RagConfig, RespondWithSummary, Retriever,
    VectorIndex, Workflow,
};

/// Deterministic embedder: characters hashed into buckets, so equal text
/// always embeds identically and shared words pull texts together.
pub struct HashEmbedder {
    pub dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let mut h = 5381usize;
            for b in word.bytes() {
                h = h.wrapping_mul(33).wrapping_add(b as usize);
            }
            v[h % self.dimension] += 1.0;
        }
        if v.iter().all(|&x| x == 0.0) {
            v[0] = 1.0;
        }
        Ok(v)
    }
}

/// Embedder that always fails with the given retriability.
pub struct FailingEmbedder {
    pub attempts: AtomicU32,
    pub retriable: bool,
}

impl FailingEmbedder {
    pub fn new(retriable: bool) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            retriable,
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.retriable {
            Err(EmbeddingError::timeout("provider unreachable"))
        } else {
            Err(EmbeddingError::malformed_input("bad request"))
        }
    }
}

/// Generator returning a fixed summary and confidence.
pub struct ScriptedGenerator {
    pub summary: String,
    pub confidence: f32,
}

impl ScriptedGenerator {
    pub fn new(summary: &str, confidence: f32) -> Self {
        Self {
            summary: summary.to_string(),
            confidence,
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        _context: &[String],
        _query: &str,
    ) -> Result<Generation, GenerationError> {
        Ok(Generation {
            summary: self.summary.clone(),
            confidence: self.confidence,
        })
    }
}

/// Generator that fails `failures` times before succeeding; with
/// `failures == u32::MAX` it never succeeds.
pub struct FlakyGenerator {
    pub attempts: AtomicU32,
    pub failures: u32,
    pub retriable: bool,
}

impl FlakyGenerator {
    pub fn always_failing(retriable: bool) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            failures: u32::MAX,
            retriable,
        }
    }

    pub fn failing_times(failures: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            failures,
            retriable: true,
        }
    }
}

#[async_trait]
impl Generator for FlakyGenerator {
    async fn generate(
        &self,
        _context: &[String],
        _query: &str,
    ) -> Result<Generation, GenerationError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            if self.retriable {
                Err(GenerationError::quota_exceeded("rate limited"))
            } else {
                Err(GenerationError::malformed_input("prompt rejected"))
            }
        } else {
            Ok(Generation {
                summary: format!("recovered on attempt {attempt}"),
                confidence: 0.95,
            })
        }
    }
}

/// Generator that sleeps past any reasonable call timeout.
pub struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn generate(
        &self,
        _context: &[String],
        _query: &str,
    ) -> Result<Generation, GenerationError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the call timeout fires first")
    }
}

/// Resolver that always fails.
pub struct FailingResolver;

#[async_trait]
impl ActionResolver for FailingResolver {
    async fn resolve(&self, _summary: &str) -> Result<String, GenerationError> {
        Err(GenerationError::malformed_input("cannot derive action"))
    }
}

/// A small fixed corpus about weather phenomena.
pub fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "sky",
            "Why the sky is blue",
            "The sky appears blue because air molecules scatter short blue \
             wavelengths of sunlight more strongly than red wavelengths.",
        ),
        Document::new(
            "rain",
            "How rain forms",
            "Rain forms when water vapour condenses into droplets around \
             dust particles and the droplets grow heavy enough to fall.",
        ),
        Document::new(
            "wind",
            "What causes wind",
            "Wind is the movement of air from regions of high pressure \
             toward regions of low pressure across the surface.",
        ),
    ]
}

/// Quick config suitable for tests: tiny backoff, short timeout.
pub fn test_config() -> RagConfig {
    RagConfig::builder()
        .chunk_size(200)
        .chunk_overlap(20)
        .top_k(2)
        .retry_max_attempts(2)
        .retry_backoff_ms(1)
        .call_timeout_ms(500)
        .build()
        .unwrap()
}

/// Build a workflow over the weather corpus with the given collaborators.
pub async fn pipeline(
    config: &RagConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn CheckpointStore>,
) -> Workflow {
    pipeline_with_resolver(config, embedder, generator, Arc::new(RespondWithSummary), store).await
}

pub async fn pipeline_with_resolver(
    config: &RagConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    resolver: Arc<dyn ActionResolver>,
    store: Arc<dyn CheckpointStore>,
) -> Workflow {
    let indexer = Arc::new(HashEmbedder::new(embedder.dimension()));
    let index = Arc::new(RwLock::new(
        VectorIndex::new(embedder.dimension(), &config.index).unwrap(),
    ));
    let catalog = Arc::new(RwLock::new(DocumentCatalog::new()));

    let ingestor = Ingestor::new(
        indexer,
        Arc::clone(&index),
        Arc::clone(&catalog),
        config,
    );
    for doc in corpus() {
        ingestor.ingest(doc).await.unwrap();
    }

    let retriever = Arc::new(Retriever::new(embedder, index, catalog));
    Workflow::new(config, retriever, generator, resolver, store).unwrap()
}
