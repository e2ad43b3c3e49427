//! Confidence-gated answer workflow over the retrieval pipeline.

mod graph;
mod state;

pub use graph::{RunReport, Workflow, WorkflowError};
pub use state::{EscalationReason, GraphState, WorkflowNode, HUMAN_REVIEW_ACTION};
