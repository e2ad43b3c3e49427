//! Durable run history.
//!
//! Every node transition appends a [`Checkpoint`] to the store, so a run
//! can be inspected after the fact, resumed after a crash, or rolled back
//! to an earlier node. The log is append-only per run; [`rollback`] is the
//! one operation that truncates it, and it never rewrites surviving rows.
//!
//! Two backends ship: [`InMemoryCheckpointStore`] for tests and ephemeral
//! runs, [`SqliteCheckpointStore`] for durability.
//!
//! [`rollback`]: CheckpointStore::rollback

mod memory;
mod sqlite;

pub use memory::InMemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::{GraphState, WorkflowNode};

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint backend failure: {message}")]
    #[diagnostic(code(ragline::checkpoint::backend))]
    Backend { message: String },

    #[error("checkpoint state could not be (de)serialized")]
    #[diagnostic(code(ragline::checkpoint::serde))]
    Serde(#[from] serde_json::Error),

    #[error("run `{run_id}` has no checkpoints")]
    #[diagnostic(code(ragline::checkpoint::unknown_run))]
    UnknownRun { run_id: String },

    #[error("run `{run_id}` never visited node `{node}`")]
    #[diagnostic(
        code(ragline::checkpoint::invalid_state),
        help("rollback targets must name a node present in the run's history")
    )]
    InvalidState { run_id: String, node: WorkflowNode },
}

impl From<::sqlx::Error> for CheckpointError {
    fn from(err: ::sqlx::Error) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Outcome recorded with a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Ok,
    Failed,
    Escalated,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Some(match s {
            "ok" => Self::Ok,
            "failed" => Self::Failed,
            "escalated" => Self::Escalated,
            _ => return None,
        })
    }
}

/// One entry in a run's history: the state as it stood *after* `node`
/// executed, with a per-run sequence number assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub sequence: u64,
    pub node: WorkflowNode,
    pub state: GraphState,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
}

/// Append-only checkpoint log, keyed by run id.
///
/// `save` assigns sequence numbers; concurrent saves for *different* runs
/// never interfere, and a backend must serialize saves within one run.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint and return its sequence number.
    async fn save(
        &self,
        run_id: &str,
        node: WorkflowNode,
        state: &GraphState,
        status: CheckpointStatus,
    ) -> Result<u64, CheckpointError>;

    /// Full history for a run in ascending sequence order. Empty when the
    /// run is unknown.
    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, CheckpointError>;

    /// The most recent checkpoint, or `None` for an unknown run.
    async fn latest(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Truncate the run's history back to its earliest visit of `node` and
    /// return the state recorded there. Fails with `UnknownRun` if the run
    /// has no history and `InvalidState` if it never visited `node`.
    async fn rollback(&self, run_id: &str, node: WorkflowNode) -> Result<GraphState, CheckpointError>;

    /// Ids of all runs with at least one checkpoint, sorted.
    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError>;
}
