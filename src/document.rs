//! Core data model for documents, chunks, and retrieval results.
//!
//! A [`Document`] is the unit of ingestion; the chunker derives [`Chunk`]s
//! from it, each carrying exact character offsets back into the source text.
//! Retrieval produces [`ScoredChunk`]s ordered by descending similarity.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// String-keyed metadata attached to documents and inherited by their chunks.
pub type Metadata = FxHashMap<String, String>;

/// An ingested document. Immutable once ingested; re-ingesting a document
/// with the same `id` supersedes it (and all of its chunks).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
            metadata: Metadata::default(),
        }
    }

    /// Attach a metadata key/value pair.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded contiguous span of a document's text, the unit of indexing.
///
/// Offsets are **character** offsets into the source text:
/// `document.text.chars().skip(start_offset).take(end_offset - start_offset)`
/// reproduces `text` exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A retrieval request: free-text query plus result shaping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
}

impl Query {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filter: None,
        }
    }

    /// Restrict results to chunks whose metadata matches the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Equality post-filter over chunk metadata: a chunk matches when every
/// `key = value` pair in the filter is present in its metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: Metadata,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }
}

/// One retrieval hit: chunk identity, similarity score, and hydrated content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f32,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}
