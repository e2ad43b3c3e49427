//! Vector index: exact and approximate nearest-neighbour search over
//! L2-normalized embeddings.
//!
//! Three interchangeable strategies sit behind the [`VectorIndex`] facade:
//!
//! - [`FlatIndex`]: brute-force exact search, the correctness baseline.
//! - [`IvfIndex`]: inverted-file partitioning: k-means clusters the
//!   vectors into `nlist` cells and queries probe only the `nprobe`
//!   closest cells.
//! - [`HnswIndex`]: a layered proximity graph with greedy descent.
//!
//! All strategies normalize vectors on insert and score with the dot
//! product, which on unit vectors equals cosine similarity. Ties are
//! broken by ascending chunk id so rankings are fully deterministic.

mod flat;
mod hnsw;
mod ivf;
mod persist;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::IvfIndex;
pub use persist::{load_index, save_index};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigurationError, IndexStrategy};

/// Seed for every stochastic choice inside the index (k-means init, HNSW
/// level sampling), so identical insert sequences build identical indexes.
pub(crate) const INDEX_SEED: u64 = 0x5eed_1d;

#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("vector for `{context}` has {got} dimensions, index expects {expected}")]
    #[diagnostic(code(ragline::index::dimension_mismatch))]
    DimensionMismatch {
        context: String,
        expected: usize,
        got: usize,
    },

    #[error("chunk id `{chunk_id}` is already indexed")]
    #[diagnostic(
        code(ragline::index::duplicate_key),
        help("use insert_or_replace to overwrite an existing entry")
    )]
    DuplicateKey { chunk_id: String },

    #[error("cannot search an empty index")]
    #[diagnostic(code(ragline::index::empty))]
    EmptyIndex,

    #[error("vector for `{context}` has zero magnitude; cosine similarity is undefined")]
    #[diagnostic(code(ragline::index::zero_vector))]
    ZeroVector { context: String },

    #[error("operation `{operation}` is not supported by the {strategy} strategy")]
    #[diagnostic(code(ragline::index::unsupported))]
    UnsupportedOperation {
        operation: &'static str,
        strategy: &'static str,
    },

    #[error("index persistence failed: {message}")]
    #[diagnostic(code(ragline::index::persist))]
    Persist { message: String },

    #[error("index file is malformed: {message}")]
    #[diagnostic(code(ragline::index::format))]
    Format { message: String },

    #[error(transparent)]
    #[diagnostic(code(ragline::index::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(ragline::index::serde))]
    Serde(#[from] serde_json::Error),
}

/// One search result: a chunk id with its cosine similarity to the query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
}

/// Strategy facade. Construct with [`VectorIndex::new`], then `insert` and
/// `search` without caring which structure backs it.
#[derive(Debug)]
pub enum VectorIndex {
    Flat(FlatIndex),
    Ivf(IvfIndex),
    Hnsw(HnswIndex),
}

impl VectorIndex {
    pub fn new(dimension: usize, strategy: &IndexStrategy) -> Result<Self, ConfigurationError> {
        strategy.validate()?;
        if dimension == 0 {
            return Err(ConfigurationError::InvalidIndexParams(
                "index dimension must be greater than zero".into(),
            ));
        }
        Ok(match *strategy {
            IndexStrategy::Flat => Self::Flat(FlatIndex::new(dimension)),
            IndexStrategy::Ivf { nlist, nprobe } => {
                Self::Ivf(IvfIndex::new(dimension, nlist, nprobe))
            }
            IndexStrategy::Hnsw {
                m,
                ef_construction,
                ef_search,
            } => Self::Hnsw(HnswIndex::new(dimension, m, ef_construction, ef_search)),
        })
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Flat(i) => i.dimension(),
            Self::Ivf(i) => i.dimension(),
            Self::Hnsw(i) => i.dimension(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(i) => i.len(),
            Self::Ivf(i) => i.len(),
            Self::Hnsw(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::Flat(_) => "flat",
            Self::Ivf(_) => "ivf",
            Self::Hnsw(_) => "hnsw",
        }
    }

    /// Insert a new entry. Fails on duplicate id, dimension mismatch, or a
    /// zero-magnitude vector.
    pub fn insert(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.insert(chunk_id, vector),
            Self::Ivf(i) => i.insert(chunk_id, vector),
            Self::Hnsw(i) => i.insert(chunk_id, vector),
        }
    }

    /// Insert, overwriting any existing entry under the same id.
    pub fn insert_or_replace(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        match self {
            Self::Flat(i) => i.insert_or_replace(chunk_id, vector),
            Self::Ivf(i) => i.insert_or_replace(chunk_id, vector),
            Self::Hnsw(i) => i.insert_or_replace(chunk_id, vector),
        }
    }

    /// Remove an entry. Returns whether it existed. HNSW does not support
    /// removal and fails with [`IndexError::UnsupportedOperation`].
    pub fn remove(&mut self, chunk_id: &str) -> Result<bool, IndexError> {
        match self {
            Self::Flat(i) => Ok(i.remove(chunk_id)),
            Self::Ivf(i) => Ok(i.remove(chunk_id)),
            Self::Hnsw(_) => Err(IndexError::UnsupportedOperation {
                operation: "remove",
                strategy: "hnsw",
            }),
        }
    }

    /// Top-`k` most similar entries, ordered by descending score with ties
    /// broken by ascending chunk id. Returns fewer than `k` hits when the
    /// index holds fewer entries; fails on an empty index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        match self {
            Self::Flat(i) => i.search(query, k),
            Self::Ivf(i) => i.search(query, k),
            Self::Hnsw(i) => i.search(query, k),
        }
    }
}

/// L2-normalize, rejecting zero or non-finite magnitudes.
pub(crate) fn normalize(vector: &[f32], context: &str) -> Result<Vec<f32>, IndexError> {
    let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
    if norm_sq <= 0.0 || !norm_sq.is_finite() {
        return Err(IndexError::ZeroVector {
            context: context.to_string(),
        });
    }
    let norm = norm_sq.sqrt();
    Ok(vector.iter().map(|x| x / norm).collect())
}

pub(crate) fn check_dimension(
    vector: &[f32],
    expected: usize,
    context: &str,
) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            context: context.to_string(),
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}

/// Dot product; on unit vectors this is cosine similarity.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sort hits by descending score, ascending chunk id on ties, then keep `k`.
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(k);
    hits
}
