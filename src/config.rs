//! Pipeline configuration with eager validation.
//!
//! All tunables live in [`RagConfig`]. Construction goes through
//! [`RagConfigBuilder`], which validates every field before a config is
//! handed to the pipeline; nothing downstream re-checks these invariants.

use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values, reported at construction time.
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum ConfigurationError {
    #[error("chunk_size must be greater than zero")]
    #[diagnostic(code(ragline::config::chunk_size))]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be strictly less than chunk_size ({chunk_size})")]
    #[diagnostic(
        code(ragline::config::chunk_overlap),
        help("pick an overlap smaller than the chunk size so each step advances")
    )]
    OverlapTooLarge { chunk_size: usize, overlap: usize },

    #[error("top_k must be greater than zero")]
    #[diagnostic(code(ragline::config::top_k))]
    ZeroTopK,

    #[error("confidence_threshold ({0}) must lie within [0.0, 1.0]")]
    #[diagnostic(code(ragline::config::confidence_threshold))]
    ThresholdOutOfRange(f32),

    #[error("max_iterations must be greater than zero")]
    #[diagnostic(code(ragline::config::max_iterations))]
    ZeroMaxIterations,

    #[error("retry_max_attempts must be at least one")]
    #[diagnostic(code(ragline::config::retry_attempts))]
    ZeroRetryAttempts,

    #[error("invalid index parameters: {0}")]
    #[diagnostic(code(ragline::config::index_params))]
    InvalidIndexParams(String),
}

/// Which approximate/exact search structure backs the vector index.
///
/// `Flat` is exact brute force. `Ivf` partitions vectors into `nlist`
/// clusters and probes the `nprobe` closest at query time (`nprobe == nlist`
/// degenerates to exact search). `Hnsw` builds a layered proximity graph;
/// `ef_search` trades latency for recall.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "index_strategy", rename_all = "lowercase")]
pub enum IndexStrategy {
    Flat,
    Ivf {
        nlist: usize,
        nprobe: usize,
    },
    Hnsw {
        m: usize,
        ef_construction: usize,
        ef_search: usize,
    },
}

impl IndexStrategy {
    /// Default IVF shape: 16 partitions, half of them probed. At these
    /// defaults recall against the flat baseline stays above 0.9 on
    /// clustered corpora.
    pub fn ivf_defaults() -> Self {
        Self::Ivf {
            nlist: 16,
            nprobe: 8,
        }
    }

    /// Default HNSW shape, sized for corpora in the thousands of chunks.
    pub fn hnsw_defaults() -> Self {
        Self::Hnsw {
            m: 16,
            ef_construction: 128,
            ef_search: 64,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::Flat => Ok(()),
            Self::Ivf { nlist, nprobe } => {
                if *nlist == 0 {
                    return Err(ConfigurationError::InvalidIndexParams(
                        "nlist must be greater than zero".into(),
                    ));
                }
                if *nprobe == 0 || nprobe > nlist {
                    return Err(ConfigurationError::InvalidIndexParams(format!(
                        "nprobe ({nprobe}) must lie within [1, nlist = {nlist}]"
                    )));
                }
                Ok(())
            }
            Self::Hnsw {
                m,
                ef_construction,
                ef_search,
            } => {
                if *m < 2 {
                    return Err(ConfigurationError::InvalidIndexParams(
                        "m must be at least 2".into(),
                    ));
                }
                if *ef_construction < *m {
                    return Err(ConfigurationError::InvalidIndexParams(format!(
                        "ef_construction ({ef_construction}) must be at least m ({m})"
                    )));
                }
                if *ef_search == 0 {
                    return Err(ConfigurationError::InvalidIndexParams(
                        "ef_search must be greater than zero".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

impl Default for IndexStrategy {
    fn default() -> Self {
        Self::Flat
    }
}

/// Validated pipeline configuration. Obtain via [`RagConfig::builder`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub confidence_threshold: f32,
    pub max_iterations: u32,
    #[serde(flatten)]
    pub index: IndexStrategy,
    pub retry_max_attempts: u32,
    pub call_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            confidence_threshold: 0.7,
            max_iterations: 16,
            index: IndexStrategy::Flat,
            retry_max_attempts: 3,
            call_timeout_ms: 10_000,
            retry_backoff_ms: 100,
        }
    }
}

impl RagConfig {
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.chunk_size == 0 {
            return Err(ConfigurationError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigurationError::OverlapTooLarge {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigurationError::ZeroTopK);
        }
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(ConfigurationError::ThresholdOutOfRange(
                self.confidence_threshold,
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigurationError::ZeroMaxIterations);
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigurationError::ZeroRetryAttempts);
        }
        self.index.validate()
    }
}

/// Fluent builder for [`RagConfig`]. `build()` is the single validation
/// gate; invalid values never escape it.
#[derive(Clone, Debug, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.config.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    #[must_use]
    pub fn confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn index_strategy(mut self, strategy: IndexStrategy) -> Self {
        self.config.index = strategy;
        self
    }

    #[must_use]
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn call_timeout_ms(mut self, millis: u64) -> Self {
        self.config.call_timeout_ms = millis;
        self
    }

    #[must_use]
    pub fn retry_backoff_ms(mut self, millis: u64) -> Self {
        self.config.retry_backoff_ms = millis;
        self
    }

    pub fn build(self) -> Result<RagConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
