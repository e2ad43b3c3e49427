//! Seams to external model providers.
//!
//! The pipeline never talks to an embedding or generation backend directly;
//! it goes through the [`Embedder`], [`Generator`], and [`ActionResolver`]
//! traits so providers can be swapped (or mocked) without touching the
//! workflow. Adapter errors carry a `retriable` flag that drives the
//! workflow's retry policy: transient faults (timeouts, quota) are retried
//! with backoff, permanent ones (malformed input) are not.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of an adapter failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    Timeout,
    MalformedInput,
    QuotaExceeded,
    Other,
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::MalformedInput => "malformed input",
            Self::QuotaExceeded => "quota exceeded",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Failure raised by an [`Embedder`].
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
#[error("embedding call failed ({kind}): {message}")]
#[diagnostic(
    code(ragline::adapters::embedding),
    help("transient failures are retried; check the provider if they persist")
)]
pub struct EmbeddingError {
    pub kind: AdapterErrorKind,
    pub retriable: bool,
    pub message: String,
}

impl EmbeddingError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Timeout,
            retriable: true,
            message: message.into(),
        }
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::MalformedInput,
            retriable: false,
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::QuotaExceeded,
            retriable: true,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>, retriable: bool) -> Self {
        Self {
            kind: AdapterErrorKind::Other,
            retriable,
            message: message.into(),
        }
    }
}

/// Failure raised by a [`Generator`] or [`ActionResolver`].
#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
#[error("generation call failed ({kind}): {message}")]
#[diagnostic(code(ragline::adapters::generation))]
pub struct GenerationError {
    pub kind: AdapterErrorKind,
    pub retriable: bool,
    pub message: String,
}

impl GenerationError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::Timeout,
            retriable: true,
            message: message.into(),
        }
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::MalformedInput,
            retriable: false,
            message: message.into(),
        }
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self {
            kind: AdapterErrorKind::QuotaExceeded,
            retriable: true,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>, retriable: bool) -> Self {
        Self {
            kind: AdapterErrorKind::Other,
            retriable,
            message: message.into(),
        }
    }
}

/// Maps text to a fixed-dimension embedding vector.
///
/// Implementations must be deterministic per input within a session and
/// always return vectors of exactly `dimension()` entries.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// A grounded summary together with the model's self-reported confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub summary: String,
    /// Expected in `[0.0, 1.0]`; the workflow clamps out-of-range values.
    pub confidence: f32,
}

/// Produces a summary of the retrieved context, conditioned on the query.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &[String], query: &str) -> Result<Generation, GenerationError>;
}

/// Derives the terminal action a run commits to from its summary.
#[async_trait]
pub trait ActionResolver: Send + Sync {
    async fn resolve(&self, summary: &str) -> Result<String, GenerationError>;
}

/// Default resolver: the action is the summary presented as an answer.
#[derive(Clone, Copy, Debug, Default)]
pub struct RespondWithSummary;

#[async_trait]
impl ActionResolver for RespondWithSummary {
    async fn resolve(&self, summary: &str) -> Result<String, GenerationError> {
        Ok(format!("respond: {summary}"))
    }
}
