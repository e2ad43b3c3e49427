//! The workflow driver.
//!
//! A run walks the fixed graph
//! `START → RETRIEVE → SUMMARIZE → DECIDE → {ACTION | ESCALATE} → END`,
//! executing exactly one node at a time and appending a checkpoint after
//! every transition. External calls (retrieval, generation, action
//! resolution) go through a retry loop with exponential backoff and a
//! per-call timeout; when a call fails past its budget the run is routed
//! to ESCALATE rather than surfacing the failure, so every run reaches END
//! with `action` populated. The only errors a caller sees are invalid
//! configuration and resume/rollback requests that reference bad history.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ActionResolver, GenerationError, Generator};
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStatus, CheckpointStore};
use crate::config::{ConfigurationError, RagConfig};
use crate::document::Query;
use crate::retriever::{RetrieveError, Retriever};

use super::state::{
    clamp_confidence, EscalationReason, GraphState, WorkflowNode, HUMAN_REVIEW_ACTION,
};

#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigurationError),

    #[error("run `{run_id}` has no recorded history")]
    #[diagnostic(code(ragline::workflow::unknown_run))]
    UnknownRun { run_id: String },

    #[error("run `{run_id}` already reached END and cannot be resumed")]
    #[diagnostic(code(ragline::workflow::run_complete))]
    RunAlreadyComplete { run_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub run_id: String,
    pub final_state: GraphState,
    /// Nodes executed, in order. Excludes START and END, which do no work.
    pub path: Vec<WorkflowNode>,
}

#[derive(Clone, Copy, Debug)]
struct RetryPolicy {
    max_attempts: u32,
    call_timeout: Duration,
    base_backoff: Duration,
}

/// Errors whose `retriable` flag the retry loop consults.
trait Retriable: std::fmt::Display {
    fn retriable(&self) -> bool;
}

impl Retriable for RetrieveError {
    fn retriable(&self) -> bool {
        RetrieveError::retriable(self)
    }
}

impl Retriable for GenerationError {
    fn retriable(&self) -> bool {
        self.retriable
    }
}

pub struct Workflow {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generator>,
    resolver: Arc<dyn ActionResolver>,
    store: Arc<dyn CheckpointStore>,
    top_k: usize,
    confidence_threshold: f32,
    max_iterations: u32,
    retry: RetryPolicy,
}

impl Workflow {
    pub fn new(
        config: &RagConfig,
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generator>,
        resolver: Arc<dyn ActionResolver>,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            retriever,
            generator,
            resolver,
            store,
            top_k: config.top_k,
            confidence_threshold: config.confidence_threshold,
            max_iterations: config.max_iterations,
            retry: RetryPolicy {
                max_attempts: config.retry_max_attempts,
                call_timeout: config.call_timeout(),
                base_backoff: config.retry_backoff(),
            },
        })
    }

    /// Execute a fresh run under a generated run id.
    pub async fn run(&self, query: &str) -> Result<RunReport, WorkflowError> {
        self.run_with_id(Uuid::new_v4().to_string(), query).await
    }

    /// Execute a fresh run under a caller-chosen run id.
    pub async fn run_with_id(
        &self,
        run_id: String,
        query: &str,
    ) -> Result<RunReport, WorkflowError> {
        self.drive(run_id, GraphState::new(query), WorkflowNode::Retrieve)
            .await
    }

    /// Pick up an interrupted run from its latest checkpoint, re-entering
    /// at the node that follows the checkpointed one.
    pub async fn resume(&self, run_id: &str) -> Result<RunReport, WorkflowError> {
        let latest =
            self.store
                .latest(run_id)
                .await?
                .ok_or_else(|| WorkflowError::UnknownRun {
                    run_id: run_id.to_string(),
                })?;
        let next = resume_entry(&latest);
        if next == WorkflowNode::End {
            return Err(WorkflowError::RunAlreadyComplete {
                run_id: run_id.to_string(),
            });
        }
        info!(run_id, resume_at = %next, "resuming run");
        self.drive(run_id.to_string(), latest.state, next).await
    }

    #[instrument(level = "info", skip(self, state), fields(run_id = %run_id))]
    async fn drive(
        &self,
        run_id: String,
        mut state: GraphState,
        mut node: WorkflowNode,
    ) -> Result<RunReport, WorkflowError> {
        let mut path = Vec::new();
        loop {
            match node {
                WorkflowNode::End => break,
                WorkflowNode::Start => {
                    node = WorkflowNode::Retrieve;
                    continue;
                }
                _ => {}
            }

            // Safety valve: the graph is acyclic, but this bound holds even
            // if a future edge introduces a cycle.
            if node != WorkflowNode::Escalate && state.iteration_count >= self.max_iterations {
                warn!(
                    iterations = state.iteration_count,
                    limit = self.max_iterations,
                    "iteration limit reached, escalating"
                );
                state.escalation = Some(EscalationReason::MaxIterationsExceeded);
                node = WorkflowNode::Escalate;
            }

            state.iteration_count += 1;
            let (next_state, status, next) = self.execute(node, state).await;
            state = next_state;

            // A checkpoint write failure must not kill an otherwise healthy
            // run; the history just gets a gap.
            if let Err(err) = self.store.save(&run_id, node, &state, status).await {
                warn!(node = %node, error = %err, "checkpoint write failed");
            }
            path.push(node);
            node = next;
        }

        info!(
            iterations = state.iteration_count,
            action = state.action.as_deref().unwrap_or(""),
            escalated = state.escalation.is_some(),
            "run complete"
        );
        Ok(RunReport {
            run_id,
            final_state: state,
            path,
        })
    }

    /// Run one node against a private copy of the state. Returns the
    /// successor state, the status to checkpoint, and the next node.
    async fn execute(
        &self,
        node: WorkflowNode,
        mut state: GraphState,
    ) -> (GraphState, CheckpointStatus, WorkflowNode) {
        match node {
            WorkflowNode::Retrieve => {
                let query = Query::new(state.query.clone(), self.top_k);
                let outcome = self
                    .with_retries("retrieve", || self.retriever.retrieve(&query))
                    .await;
                match outcome {
                    Some(chunks) => {
                        state.documents = chunks.into_iter().map(|c| c.text).collect();
                        (state, CheckpointStatus::Ok, WorkflowNode::Summarize)
                    }
                    None => {
                        state.escalation = Some(EscalationReason::RetrievalFailed);
                        (state, CheckpointStatus::Failed, WorkflowNode::Escalate)
                    }
                }
            }
            WorkflowNode::Summarize => {
                let outcome = self
                    .with_retries("summarize", || {
                        self.generator.generate(&state.documents, &state.query)
                    })
                    .await;
                match outcome {
                    Some(generation) => {
                        let (confidence, clamped) = clamp_confidence(generation.confidence);
                        if clamped {
                            warn!(
                                raw = generation.confidence,
                                clamped = confidence,
                                "reported confidence out of range"
                            );
                        }
                        state.summary = generation.summary;
                        state.confidence = confidence;
                        (state, CheckpointStatus::Ok, WorkflowNode::Decide)
                    }
                    None => {
                        state.escalation = Some(EscalationReason::GenerationFailed);
                        (state, CheckpointStatus::Failed, WorkflowNode::Escalate)
                    }
                }
            }
            WorkflowNode::Decide => {
                // Strictly greater: confidence equal to the threshold
                // escalates.
                if state.confidence > self.confidence_threshold {
                    (state, CheckpointStatus::Ok, WorkflowNode::Action)
                } else {
                    state.escalation = Some(EscalationReason::LowConfidence);
                    (state, CheckpointStatus::Ok, WorkflowNode::Escalate)
                }
            }
            WorkflowNode::Action => {
                let outcome = self
                    .with_retries("resolve_action", || self.resolver.resolve(&state.summary))
                    .await;
                match outcome {
                    Some(action) => {
                        state.action = Some(action);
                        (state, CheckpointStatus::Ok, WorkflowNode::End)
                    }
                    None => {
                        state.escalation = Some(EscalationReason::ActionFailed);
                        (state, CheckpointStatus::Failed, WorkflowNode::Escalate)
                    }
                }
            }
            WorkflowNode::Escalate => {
                state.action = Some(HUMAN_REVIEW_ACTION.to_string());
                (state, CheckpointStatus::Escalated, WorkflowNode::End)
            }
            // Handled by the driver loop.
            WorkflowNode::Start | WorkflowNode::End => {
                (state, CheckpointStatus::Ok, WorkflowNode::End)
            }
        }
    }

    /// Retry loop shared by every external call: per-attempt timeout,
    /// exponential backoff between attempts, immediate give-up on
    /// non-retriable errors. `None` means the call budget is spent.
    async fn with_retries<T, E, F, Fut>(&self, op: &'static str, mut call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retriable,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match tokio::time::timeout(self.retry.call_timeout, call()).await {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(err)) => {
                    if !err.retriable() {
                        warn!(op, attempt, error = %err, "non-retriable failure");
                        return None;
                    }
                    if attempt >= self.retry.max_attempts {
                        warn!(op, attempt, error = %err, "retry budget exhausted");
                        return None;
                    }
                    warn!(op, attempt, error = %err, "transient failure, backing off");
                }
                Err(_) => {
                    if attempt >= self.retry.max_attempts {
                        warn!(op, attempt, "call timed out, retry budget exhausted");
                        return None;
                    }
                    warn!(op, attempt, "call timed out, backing off");
                }
            }
            let backoff = self.retry.base_backoff * 2u32.saturating_pow(attempt - 1);
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Where a resumed run re-enters, given its latest checkpoint.
fn resume_entry(latest: &Checkpoint) -> WorkflowNode {
    if latest.status == CheckpointStatus::Failed {
        return WorkflowNode::Escalate;
    }
    match latest.node {
        WorkflowNode::Start => WorkflowNode::Retrieve,
        WorkflowNode::Retrieve => WorkflowNode::Summarize,
        WorkflowNode::Summarize => WorkflowNode::Decide,
        WorkflowNode::Decide => {
            if latest.state.escalation.is_some() {
                WorkflowNode::Escalate
            } else {
                WorkflowNode::Action
            }
        }
        WorkflowNode::Action | WorkflowNode::Escalate | WorkflowNode::End => WorkflowNode::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn checkpoint(node: WorkflowNode, status: CheckpointStatus, state: GraphState) -> Checkpoint {
        Checkpoint {
            run_id: "r".into(),
            sequence: 0,
            node,
            state,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resume_reenters_after_checkpointed_node() {
        let state = GraphState::new("q");
        let cases = [
            (WorkflowNode::Retrieve, WorkflowNode::Summarize),
            (WorkflowNode::Summarize, WorkflowNode::Decide),
            (WorkflowNode::Decide, WorkflowNode::Action),
            (WorkflowNode::Action, WorkflowNode::End),
            (WorkflowNode::Escalate, WorkflowNode::End),
        ];
        for (at, expected) in cases {
            let cp = checkpoint(at, CheckpointStatus::Ok, state.clone());
            assert_eq!(resume_entry(&cp), expected, "resume after {at}");
        }
    }

    #[test]
    fn resume_after_failed_node_escalates() {
        let cp = checkpoint(
            WorkflowNode::Retrieve,
            CheckpointStatus::Failed,
            GraphState::new("q"),
        );
        assert_eq!(resume_entry(&cp), WorkflowNode::Escalate);
    }

    #[test]
    fn resume_after_low_confidence_decide_escalates() {
        let mut state = GraphState::new("q");
        state.escalation = Some(EscalationReason::LowConfidence);
        let cp = checkpoint(WorkflowNode::Decide, CheckpointStatus::Ok, state);
        assert_eq!(resume_entry(&cp), WorkflowNode::Escalate);
    }
}
