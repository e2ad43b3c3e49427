//! Brute-force exact search. Scans every entry per query; the correctness
//! baseline the approximate strategies are measured against.

use rustc_hash::FxHashMap;

use super::{check_dimension, dot, normalize, rank_hits, IndexError, SearchHit};

#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    entries: FxHashMap<String, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: FxHashMap::default(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        if self.entries.contains_key(chunk_id) {
            return Err(IndexError::DuplicateKey {
                chunk_id: chunk_id.to_string(),
            });
        }
        self.insert_or_replace(chunk_id, vector)
    }

    pub fn insert_or_replace(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        check_dimension(vector, self.dimension, chunk_id)?;
        let unit = normalize(vector, chunk_id)?;
        self.entries.insert(chunk_id.to_string(), unit);
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) -> bool {
        self.entries.remove(chunk_id).is_some()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        check_dimension(query, self.dimension, "query")?;
        let unit = normalize(query, "query")?;

        let hits = self
            .entries
            .iter()
            .map(|(id, v)| SearchHit {
                chunk_id: id.clone(),
                score: dot(&unit, v),
            })
            .collect();
        Ok(rank_hits(hits, k))
    }

    /// Entries sorted by id; used by persistence for a stable on-disk order.
    pub(crate) fn sorted_entries(&self) -> Vec<(String, Vec<f32>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Rebuild from already-normalized entries (persistence load path).
    pub(crate) fn from_entries(dimension: usize, entries: Vec<(String, Vec<f32>)>) -> Self {
        Self {
            dimension,
            entries: entries.into_iter().collect(),
        }
    }
}
