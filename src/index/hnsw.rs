//! Hierarchical navigable small-world (HNSW) approximate search.
//!
//! Nodes live in a stack of layers: every node is present at layer 0, and
//! each node's top layer is drawn from a geometric distribution so upper
//! layers form a sparse long-range skeleton. A query descends greedily
//! from the top layer to layer 1, then runs a best-first beam of width
//! `ef_search` at layer 0. Larger `ef_search` widens the beam and can only
//! improve recall, at the cost of more distance evaluations.
//!
//! Level sampling uses a seeded generator, so identical insert sequences
//! build identical graphs. Removal is not supported; replacement rewrites
//! the stored vector in place and keeps the existing links.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{check_dimension, dot, normalize, rank_hits, IndexError, SearchHit, INDEX_SEED};

const MAX_LEVEL: usize = 16;

/// Heap entry ordered by score, node index as tiebreak. Scores are finite
/// (vectors are unit length), so `total_cmp` gives a true total order.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Scored {
    score: f32,
    node: usize,
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct HnswIndex {
    dimension: usize,
    m: usize,
    /// Link capacity at layer 0 (`2 * m`, per the usual construction).
    m0: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f64,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    /// `links[node][layer]` holds the node's neighbours at that layer.
    /// A node has entries only up to its sampled top layer.
    links: Vec<Vec<Vec<usize>>>,
    id_to_node: FxHashMap<String, usize>,
    entry_point: Option<usize>,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dimension: usize, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self {
            dimension,
            m,
            m0: m * 2,
            ef_construction,
            ef_search,
            level_mult: 1.0 / (m.max(2) as f64).ln(),
            ids: Vec::new(),
            vectors: Vec::new(),
            links: Vec::new(),
            id_to_node: FxHashMap::default(),
            entry_point: None,
            rng: StdRng::seed_from_u64(INDEX_SEED),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    /// Adjust the query beam width. Minimum 1.
    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.ef_search = ef_search.max(1);
    }

    pub fn insert(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        if self.id_to_node.contains_key(chunk_id) {
            return Err(IndexError::DuplicateKey {
                chunk_id: chunk_id.to_string(),
            });
        }
        check_dimension(vector, self.dimension, chunk_id)?;
        let unit = normalize(vector, chunk_id)?;
        self.insert_unit(chunk_id, unit);
        Ok(())
    }

    /// Replacing an existing id rewrites its vector in place; the graph
    /// links built for the old vector are kept, which is a fair
    /// approximation when the replacement embedding is close to the
    /// original (the re-ingestion case).
    pub fn insert_or_replace(&mut self, chunk_id: &str, vector: &[f32]) -> Result<(), IndexError> {
        check_dimension(vector, self.dimension, chunk_id)?;
        let unit = normalize(vector, chunk_id)?;
        if let Some(&node) = self.id_to_node.get(chunk_id) {
            self.vectors[node] = unit;
        } else {
            self.insert_unit(chunk_id, unit);
        }
        Ok(())
    }

    fn insert_unit(&mut self, chunk_id: &str, unit: Vec<f32>) {
        let node = self.ids.len();
        let level = self.sample_level();
        self.ids.push(chunk_id.to_string());
        self.vectors.push(unit);
        self.links.push(vec![Vec::new(); level + 1]);
        self.id_to_node.insert(chunk_id.to_string(), node);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node);
            return;
        };

        let top = self.top_level(entry);
        let query = self.vectors[node].clone();
        let mut cursor = entry;
        for layer in ((level + 1)..=top).rev() {
            cursor = self.greedy_closest(&query, cursor, layer);
        }

        for layer in (0..=level.min(top)).rev() {
            let found = self.search_layer(&query, cursor, self.ef_construction, layer);
            let cap = self.capacity(layer);
            for scored in found.iter().take(self.m) {
                self.connect(node, scored.node, layer, cap);
            }
            if let Some(best) = found.first() {
                cursor = best.node;
            }
        }

        if level > top {
            self.entry_point = Some(node);
        }
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let Some(entry) = self.entry_point else {
            return Err(IndexError::EmptyIndex);
        };
        check_dimension(query, self.dimension, "query")?;
        let unit = normalize(query, "query")?;

        let mut cursor = entry;
        for layer in (1..=self.top_level(entry)).rev() {
            cursor = self.greedy_closest(&unit, cursor, layer);
        }

        let ef = self.ef_search.max(k);
        let found = self.search_layer(&unit, cursor, ef, 0);
        let hits = found
            .into_iter()
            .map(|s| SearchHit {
                chunk_id: self.ids[s.node].clone(),
                score: s.score,
            })
            .collect();
        Ok(rank_hits(hits, k))
    }

    fn sample_level(&mut self) -> usize {
        let u: f64 = self.rng.random::<f64>().max(1e-12);
        ((-u.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn top_level(&self, node: usize) -> usize {
        self.links[node].len() - 1
    }

    fn capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m0
        } else {
            self.m
        }
    }

    /// Hill-climb to the locally closest node within one layer.
    fn greedy_closest(&self, query: &[f32], start: usize, layer: usize) -> usize {
        let mut current = start;
        let mut current_score = dot(query, &self.vectors[current]);
        loop {
            let mut improved = false;
            for &neighbour in &self.links[current][layer] {
                let score = dot(query, &self.vectors[neighbour]);
                if score > current_score {
                    current = neighbour;
                    current_score = score;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first beam search within one layer. Returns up to `ef` nodes
    /// sorted by descending score.
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<Scored> {
        let mut visited = FxHashSet::default();
        visited.insert(entry);
        let entry_score = dot(query, &self.vectors[entry]);

        // `frontier` is a max-heap of nodes to expand; `found` is a
        // min-heap keeping the best `ef` seen so far.
        let mut frontier = BinaryHeap::new();
        let mut found: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        frontier.push(Scored { score: entry_score, node: entry });
        found.push(Reverse(Scored { score: entry_score, node: entry }));

        while let Some(candidate) = frontier.pop() {
            let worst = found
                .peek()
                .map(|Reverse(s)| s.score)
                .unwrap_or(f32::NEG_INFINITY);
            if found.len() >= ef && candidate.score < worst {
                break;
            }
            for &neighbour in &self.links[candidate.node][layer] {
                if !visited.insert(neighbour) {
                    continue;
                }
                let score = dot(query, &self.vectors[neighbour]);
                let worst = found
                    .peek()
                    .map(|Reverse(s)| s.score)
                    .unwrap_or(f32::NEG_INFINITY);
                if found.len() < ef || score > worst {
                    frontier.push(Scored { score, node: neighbour });
                    found.push(Reverse(Scored { score, node: neighbour }));
                    if found.len() > ef {
                        found.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = found.into_iter().map(|Reverse(s)| s).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    /// Add a bidirectional edge, pruning either side back to capacity by
    /// keeping the closest neighbours.
    fn connect(&mut self, a: usize, b: usize, layer: usize, cap: usize) {
        if a == b {
            return;
        }
        if !self.links[a][layer].contains(&b) {
            self.links[a][layer].push(b);
            self.prune(a, layer, cap);
        }
        if !self.links[b][layer].contains(&a) {
            self.links[b][layer].push(a);
            self.prune(b, layer, cap);
        }
    }

    fn prune(&mut self, node: usize, layer: usize, cap: usize) {
        if self.links[node][layer].len() <= cap {
            return;
        }
        let anchor = self.vectors[node].clone();
        let mut neighbours = std::mem::take(&mut self.links[node][layer]);
        neighbours.sort_by(|&a, &b| {
            dot(&anchor, &self.vectors[b])
                .total_cmp(&dot(&anchor, &self.vectors[a]))
                .then(a.cmp(&b))
        });
        neighbours.truncate(cap);
        self.links[node][layer] = neighbours;
    }

    pub(crate) fn export_nodes(&self) -> Vec<(String, Vec<f32>, Vec<Vec<usize>>)> {
        (0..self.ids.len())
            .map(|n| (self.ids[n].clone(), self.vectors[n].clone(), self.links[n].clone()))
            .collect()
    }

    pub(crate) fn entry_point(&self) -> Option<usize> {
        self.entry_point
    }

    pub(crate) fn params(&self) -> (usize, usize, usize) {
        (self.m, self.ef_construction, self.ef_search)
    }

    /// Rebuild from persisted parts (persistence load path).
    pub(crate) fn from_parts(
        dimension: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        nodes: Vec<(String, Vec<f32>, Vec<Vec<usize>>)>,
        entry_point: Option<usize>,
    ) -> Result<Self, IndexError> {
        let count = nodes.len();
        if let Some(entry) = entry_point {
            if entry >= count {
                return Err(IndexError::Format {
                    message: format!("entry point {entry} out of range for {count} nodes"),
                });
            }
        }
        let mut index = Self::new(dimension, m, ef_construction, ef_search);
        for (id, vector, node_links) in nodes {
            for layer in &node_links {
                if layer.iter().any(|&n| n >= count) {
                    return Err(IndexError::Format {
                        message: format!("link out of range in node `{id}`"),
                    });
                }
            }
            let node = index.ids.len();
            index.id_to_node.insert(id.clone(), node);
            index.ids.push(id);
            index.vectors.push(vector);
            index.links.push(node_links);
        }
        index.entry_point = entry_point;
        Ok(index)
    }
}
