//! SQLite-backed checkpoint store.
//!
//! One row per checkpoint, keyed by `(run_id, sequence)`. The state
//! snapshot is stored as a JSON column so the schema never changes when
//! the state gains fields. Sequence assignment happens inside a
//! transaction, so writers within one run serialize on the primary key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use super::{Checkpoint, CheckpointError, CheckpointStatus, CheckpointStore};
use crate::workflow::{GraphState, WorkflowNode};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    run_id     TEXT    NOT NULL,
    sequence   INTEGER NOT NULL,
    node       TEXT    NOT NULL,
    state_json TEXT    NOT NULL,
    status     TEXT    NOT NULL,
    created_at TEXT    NOT NULL,
    PRIMARY KEY (run_id, sequence)
)";

#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (creating if necessary) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &str) -> Result<Self, CheckpointError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// Fresh in-memory database; history disappears with the pool.
    pub async fn in_memory() -> Result<Self, CheckpointError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint, CheckpointError> {
        let run_id: String = row.get("run_id");
        let sequence: i64 = row.get("sequence");
        let node_str: String = row.get("node");
        let state_json: String = row.get("state_json");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");

        let node = WorkflowNode::parse_str(&node_str).ok_or_else(|| CheckpointError::Backend {
            message: format!("unknown node `{node_str}` in row for run `{run_id}`"),
        })?;
        let status =
            CheckpointStatus::parse_str(&status_str).ok_or_else(|| CheckpointError::Backend {
                message: format!("unknown status `{status_str}` in row for run `{run_id}`"),
            })?;
        let state: GraphState = serde_json::from_str(&state_json)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Checkpoint {
            run_id,
            sequence: sequence as u64,
            node,
            state,
            status,
            created_at,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(level = "debug", skip(self, state), fields(node = %node))]
    async fn save(
        &self,
        run_id: &str,
        node: WorkflowNode,
        state: &GraphState,
        status: CheckpointStatus,
    ) -> Result<u64, CheckpointError> {
        let state_json = serde_json::to_string(state)?;
        let created_at = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), -1) + 1 AS next FROM checkpoints WHERE run_id = ?1",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;
        let sequence: i64 = row.get("next");

        sqlx::query(
            "INSERT INTO checkpoints (run_id, sequence, node, state_json, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(run_id)
        .bind(sequence)
        .bind(node.as_str())
        .bind(&state_json)
        .bind(status.as_str())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(sequence as u64)
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let rows = sqlx::query(
            "SELECT run_id, sequence, node, state_json, status, created_at
             FROM checkpoints WHERE run_id = ?1 ORDER BY sequence ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_checkpoint).collect()
    }

    async fn latest(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query(
            "SELECT run_id, sequence, node, state_json, status, created_at
             FROM checkpoints WHERE run_id = ?1 ORDER BY sequence DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    #[instrument(level = "debug", skip(self), fields(node = %node))]
    async fn rollback(
        &self,
        run_id: &str,
        node: WorkflowNode,
    ) -> Result<GraphState, CheckpointError> {
        let mut tx = self.pool.begin().await?;

        let any = sqlx::query("SELECT 1 FROM checkpoints WHERE run_id = ?1 LIMIT 1")
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await?;
        if any.is_none() {
            return Err(CheckpointError::UnknownRun {
                run_id: run_id.to_string(),
            });
        }

        let target = sqlx::query(
            "SELECT sequence, state_json FROM checkpoints
             WHERE run_id = ?1 AND node = ?2 ORDER BY sequence ASC LIMIT 1",
        )
        .bind(run_id)
        .bind(node.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CheckpointError::InvalidState {
            run_id: run_id.to_string(),
            node,
        })?;
        let sequence: i64 = target.get("sequence");
        let state_json: String = target.get("state_json");

        sqlx::query("DELETE FROM checkpoints WHERE run_id = ?1 AND sequence > ?2")
            .bind(run_id)
            .bind(sequence)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(serde_json::from_str(&state_json)?)
    }

    async fn list_runs(&self) -> Result<Vec<String>, CheckpointError> {
        let rows = sqlx::query("SELECT DISTINCT run_id FROM checkpoints ORDER BY run_id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("run_id")).collect())
    }
}
