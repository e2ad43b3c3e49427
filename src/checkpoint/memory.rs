//! In-memory checkpoint store for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{Checkpoint, CheckpointError, CheckpointStatus, CheckpointStore};
use crate::workflow::{GraphState, WorkflowNode};

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    runs: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        run_id: &str,
        node: WorkflowNode,
        state: &GraphState,
        status: CheckpointStatus,
    ) -> Result<u64, CheckpointError> {
        let mut runs = self.runs.write();
        let history = runs.entry(run_id.to_string()).or_default();
        let sequence = history.len() as u64;
        history.push(Checkpoint {
            run_id: run_id.to_string(),
            sequence,
            node,
            state: state.clone(),
            status,
            created_at: Utc::now(),
        });
        Ok(sequence)
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        Ok(self.runs.read().get(run_id).cloned().unwrap_or_default())
    }

    async fn latest(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .runs
            .read()
            .get(run_id)
            .and_then(|h| h.last().cloned()))
    }

    async fn rollback(
        &self,
        run_id: &str,
        node: WorkflowNode,
    ) -> Result<GraphState, CheckpointError> {
        let mut runs = self.runs.write();
        let history = runs.get_mut(run_id).ok_or_else(|| CheckpointError::UnknownRun {
            run_id: run_id.to_string(),
        })?;
        let position = history
            .iter()
            .position(|cp| cp.node == node)
            .ok_or(CheckpointError::InvalidState {
                run_id: run_id.to_string(),
                node,
            })?;
        history.truncate(position + 1);
        Ok(history[position].state.clone())
    }

    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.runs.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
