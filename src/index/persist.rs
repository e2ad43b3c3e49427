//! Index persistence: a versioned JSON snapshot of an index's full state.
//!
//! Loading a snapshot reconstructs the exact structure that was saved
//! (entries, IVF partition, HNSW graph), so a loaded index returns the same
//! ranking for any query as the index it was saved from.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{FlatIndex, HnswIndex, IndexError, IvfIndex, VectorIndex};

const FORMAT_VERSION: u32 = 1;
const METRIC: &str = "cosine";

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format_version: u32,
    metric: String,
    dimension: usize,
    #[serde(flatten)]
    strategy: PersistedStrategy,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
enum PersistedStrategy {
    Flat {
        entries: Vec<(String, Vec<f32>)>,
    },
    Ivf {
        nlist: usize,
        nprobe: usize,
        entries: Vec<(String, Vec<f32>)>,
        centroids: Vec<Vec<f32>>,
        assignments: Vec<(String, usize)>,
    },
    Hnsw {
        m: usize,
        ef_construction: usize,
        ef_search: usize,
        nodes: Vec<(String, Vec<f32>, Vec<Vec<usize>>)>,
        entry_point: Option<usize>,
    },
}

/// Write a snapshot of `index` to `path` as JSON.
pub fn save_index(index: &VectorIndex, path: impl AsRef<Path>) -> Result<(), IndexError> {
    let strategy = match index {
        VectorIndex::Flat(flat) => PersistedStrategy::Flat {
            entries: flat.sorted_entries(),
        },
        VectorIndex::Ivf(ivf) => PersistedStrategy::Ivf {
            nlist: ivf.nlist(),
            nprobe: ivf.nprobe(),
            entries: ivf.sorted_entries(),
            centroids: ivf.centroids().to_vec(),
            assignments: ivf.assignments(),
        },
        VectorIndex::Hnsw(hnsw) => {
            let (m, ef_construction, ef_search) = hnsw.params();
            PersistedStrategy::Hnsw {
                m,
                ef_construction,
                ef_search,
                nodes: hnsw.export_nodes(),
                entry_point: hnsw.entry_point(),
            }
        }
    };
    let snapshot = PersistedIndex {
        format_version: FORMAT_VERSION,
        metric: METRIC.to_string(),
        dimension: index.dimension(),
        strategy,
    };
    let json = serde_json::to_string(&snapshot)?;
    std::fs::write(path.as_ref(), json)?;
    info!(
        path = %path.as_ref().display(),
        entries = index.len(),
        strategy = index.strategy_name(),
        "saved index snapshot"
    );
    Ok(())
}

/// Load a snapshot previously written by [`save_index`].
pub fn load_index(path: impl AsRef<Path>) -> Result<VectorIndex, IndexError> {
    let json = std::fs::read_to_string(path.as_ref())?;
    let snapshot: PersistedIndex = serde_json::from_str(&json)?;

    if snapshot.format_version != FORMAT_VERSION {
        return Err(IndexError::Format {
            message: format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                snapshot.format_version
            ),
        });
    }
    if snapshot.metric != METRIC {
        return Err(IndexError::Format {
            message: format!("unsupported metric `{}`", snapshot.metric),
        });
    }

    let dimension = snapshot.dimension;
    let check = |entries: &[(String, Vec<f32>)]| -> Result<(), IndexError> {
        for (id, vector) in entries {
            if vector.len() != dimension {
                return Err(IndexError::Format {
                    message: format!(
                        "entry `{id}` has {} dimensions, header says {dimension}",
                        vector.len()
                    ),
                });
            }
        }
        Ok(())
    };

    let index = match snapshot.strategy {
        PersistedStrategy::Flat { entries } => {
            check(&entries)?;
            VectorIndex::Flat(FlatIndex::from_entries(dimension, entries))
        }
        PersistedStrategy::Ivf {
            nlist,
            nprobe,
            entries,
            centroids,
            assignments,
        } => {
            check(&entries)?;
            VectorIndex::Ivf(IvfIndex::from_parts(
                dimension,
                nlist,
                nprobe,
                entries,
                centroids,
                assignments,
            )?)
        }
        PersistedStrategy::Hnsw {
            m,
            ef_construction,
            ef_search,
            nodes,
            entry_point,
        } => VectorIndex::Hnsw(HnswIndex::from_parts(
            dimension,
            m,
            ef_construction,
            ef_search,
            nodes,
            entry_point,
        )?),
    };
    info!(
        path = %path.as_ref().display(),
        entries = index.len(),
        strategy = index.strategy_name(),
        "loaded index snapshot"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexStrategy;

    #[test]
    fn malformed_json_is_a_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_index(&path), Err(IndexError::Serde(_))));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v9.json");
        std::fs::write(
            &path,
            r#"{"format_version":9,"metric":"cosine","dimension":2,"strategy":"flat","entries":[]}"#,
        )
        .unwrap();
        assert!(matches!(load_index(&path), Err(IndexError::Format { .. })));
    }

    #[test]
    fn dimension_mismatch_in_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dim.json");
        std::fs::write(
            &path,
            r#"{"format_version":1,"metric":"cosine","dimension":3,"strategy":"flat","entries":[["a",[1.0,0.0]]]}"#,
        )
        .unwrap();
        assert!(matches!(load_index(&path), Err(IndexError::Format { .. })));
    }

    #[test]
    fn flat_round_trip_preserves_ranking() {
        let mut index = VectorIndex::new(2, &IndexStrategy::Flat).unwrap();
        index.insert("a", &[1.0, 0.0]).unwrap();
        index.insert("b", &[0.0, 1.0]).unwrap();
        index.insert("c", &[0.9, 0.1]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.json");
        save_index(&index, &path).unwrap();
        let loaded = load_index(&path).unwrap();

        assert_eq!(loaded.len(), 3);
        let before = index.search(&[1.0, 0.0], 3).unwrap();
        let after = loaded.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(before, after);
    }
}
