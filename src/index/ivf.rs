//! Inverted-file (IVF) approximate search.
//!
//! Entries are partitioned into `nlist` cells by k-means over their unit
//! vectors. A query scores the cell centroids first and scans only the
//! members of the `nprobe` best cells, trading recall for a fraction of the
//! flat scan cost. `nprobe == nlist` scans every cell and degenerates to
//! exact search.
//!
//! Training is deferred until the index holds enough entries to support
//! `nlist` meaningful cells; before that point queries fall back to an
//! exact scan, so small indexes lose nothing. Training is seeded and
//! iterates a fixed number of rounds, so identical insert sequences always
//! produce the same partition.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{check_dimension, dot, normalize, rank_hits, IndexError, SearchHit, INDEX_SEED};

/// Entries per cell required before k-means kicks in.
const TRAIN_FACTOR: usize = 4;
const KMEANS_ROUNDS: usize = 10;

#[derive(Debug)]
pub struct IvfIndex {
    dimension: usize,
    nlist: usize,
    nprobe: usize,
    entries: FxHashMap<String, Vec<f32>>,
    centroids: Vec<Vec<f32>>,
    /// Chunk ids per centroid; empty until trained.
    cells: Vec<Vec<String>>,
    assignment: FxHashMap<String, usize>,
}

impl IvfIndex {
    pub fn new(dimension: usize, nlist: usize, nprobe: usize) -> Self {
        Self {
            dimension,
            nlist,
            nprobe,
            entries: FxHashMap::default(),
            centroids: Vec::new(),
            cells: Vec::new(),
            assignment: FxHashMap::default(),
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

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    /// Adjust the probe width. Clamped to `[1, nlist]`.
    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.clamp(1, self.nlist);
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
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
        self.evict(chunk_id);
        if self.is_trained() {
            let cell = self.nearest_centroid(&unit);
            self.cells[cell].push(chunk_id.to_string());
            self.assignment.insert(chunk_id.to_string(), cell);
        }
        self.entries.insert(chunk_id.to_string(), unit);
        if !self.is_trained() && self.entries.len() >= self.nlist * TRAIN_FACTOR {
            self.train();
        }
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) -> bool {
        let existed = self.entries.remove(chunk_id).is_some();
        if existed {
            self.evict_from_cells(chunk_id);
        }
        existed
    }

    fn evict(&mut self, chunk_id: &str) {
        if self.entries.remove(chunk_id).is_some() {
            self.evict_from_cells(chunk_id);
        }
    }

    fn evict_from_cells(&mut self, chunk_id: &str) {
        if let Some(cell) = self.assignment.remove(chunk_id) {
            self.cells[cell].retain(|id| id != chunk_id);
        }
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.entries.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        check_dimension(query, self.dimension, "query")?;
        let unit = normalize(query, "query")?;

        if !self.is_trained() {
            let hits = self
                .entries
                .iter()
                .map(|(id, v)| SearchHit {
                    chunk_id: id.clone(),
                    score: dot(&unit, v),
                })
                .collect();
            return Ok(rank_hits(hits, k));
        }

        // Rank cells by centroid similarity; a wider nprobe only extends
        // this prefix, so the candidate set grows monotonically with it.
        let mut cell_order: Vec<usize> = (0..self.centroids.len()).collect();
        cell_order.sort_by(|&a, &b| {
            dot(&unit, &self.centroids[b])
                .partial_cmp(&dot(&unit, &self.centroids[a]))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut hits = Vec::new();
        for &cell in cell_order.iter().take(self.nprobe) {
            for id in &self.cells[cell] {
                if let Some(v) = self.entries.get(id) {
                    hits.push(SearchHit {
                        chunk_id: id.clone(),
                        score: dot(&unit, v),
                    });
                }
            }
        }
        Ok(rank_hits(hits, k))
    }

    fn nearest_centroid(&self, unit: &[f32]) -> usize {
        let mut best = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for (i, c) in self.centroids.iter().enumerate() {
            let score = dot(unit, c);
            if score > best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }

    /// Seeded k-means over the current entries.
    fn train(&mut self) {
        let mut ordered: Vec<(&String, &Vec<f32>)> = self.entries.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));
        let n = ordered.len();
        let k = self.nlist.min(n).max(1);

        let mut rng = StdRng::seed_from_u64(INDEX_SEED);
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
        let mut taken = vec![false; n];
        while centroids.len() < k {
            let pick = rng.random_range(0..n);
            if !taken[pick] {
                taken[pick] = true;
                centroids.push(ordered[pick].1.clone());
            }
        }

        let mut labels = vec![0usize; n];
        for _ in 0..KMEANS_ROUNDS {
            for (i, (_, v)) in ordered.iter().enumerate() {
                let mut best = 0usize;
                let mut best_score = f32::NEG_INFINITY;
                for (c, centroid) in centroids.iter().enumerate() {
                    let score = dot(v, centroid);
                    if score > best_score {
                        best = c;
                        best_score = score;
                    }
                }
                labels[i] = best;
            }
            for (c, centroid) in centroids.iter_mut().enumerate() {
                let mut sum = vec![0.0f32; self.dimension];
                let mut count = 0usize;
                for (i, (_, v)) in ordered.iter().enumerate() {
                    if labels[i] == c {
                        for (s, x) in sum.iter_mut().zip(v.iter()) {
                            *s += x;
                        }
                        count += 1;
                    }
                }
                if count == 0 {
                    continue;
                }
                let norm_sq: f32 = sum.iter().map(|x| x * x).sum();
                if norm_sq > 0.0 {
                    let norm = norm_sq.sqrt();
                    *centroid = sum.iter().map(|x| x / norm).collect();
                }
            }
        }

        let mut cells = vec![Vec::new(); centroids.len()];
        let mut assignment = FxHashMap::default();
        for (i, (id, _)) in ordered.iter().enumerate() {
            cells[labels[i]].push((*id).clone());
            assignment.insert((*id).clone(), labels[i]);
        }

        debug!(entries = n, cells = centroids.len(), "trained ivf partition");
        self.centroids = centroids;
        self.cells = cells;
        self.assignment = assignment;
    }

    pub(crate) fn sorted_entries(&self) -> Vec<(String, Vec<f32>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub(crate) fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub(crate) fn assignments(&self) -> Vec<(String, usize)> {
        let mut out: Vec<_> = self
            .assignment
            .iter()
            .map(|(id, &cell)| (id.clone(), cell))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Rebuild from persisted parts (persistence load path).
    pub(crate) fn from_parts(
        dimension: usize,
        nlist: usize,
        nprobe: usize,
        entries: Vec<(String, Vec<f32>)>,
        centroids: Vec<Vec<f32>>,
        assignments: Vec<(String, usize)>,
    ) -> Result<Self, IndexError> {
        let mut cells = vec![Vec::new(); centroids.len()];
        let mut assignment = FxHashMap::default();
        for (id, cell) in assignments {
            if cell >= cells.len() {
                return Err(IndexError::Format {
                    message: format!("cell {cell} out of range for `{id}`"),
                });
            }
            cells[cell].push(id.clone());
            assignment.insert(id, cell);
        }
        Ok(Self {
            dimension,
            nlist,
            nprobe,
            entries: entries.into_iter().collect(),
            centroids,
            cells,
            assignment,
        })
    }
}
