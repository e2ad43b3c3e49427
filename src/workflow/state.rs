//! Workflow state and node taxonomy.
//!
//! [`GraphState`] is the single snapshot handed from node to node. Nodes
//! never mutate shared state in place: the driver clones the snapshot,
//! lets the node produce its successor, and only commits it if the node
//! finished, so a failed node leaves no partial writes behind.

use serde::{Deserialize, Serialize};

/// Action committed when a run leaves through the escalation path.
pub const HUMAN_REVIEW_ACTION: &str = "human_review_required";

/// Why a run was routed to ESCALATE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// DECIDE saw confidence at or below the threshold.
    LowConfidence,
    /// Retrieval failed after exhausting retries (or non-retriably).
    RetrievalFailed,
    /// Summarization failed after exhausting retries (or non-retriably).
    GenerationFailed,
    /// The action resolver failed.
    ActionFailed,
    /// The iteration safety valve tripped.
    MaxIterationsExceeded,
}

/// Per-run state snapshot. Serialization is strict: a checkpoint written
/// by a different shape of this struct fails to load rather than silently
/// dropping fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphState {
    pub query: String,
    /// Texts of the retrieved chunks, in retrieval order.
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default)]
    pub escalation: Option<EscalationReason>,
}

impl GraphState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            documents: Vec::new(),
            summary: String::new(),
            confidence: 0.0,
            action: None,
            iteration_count: 0,
            escalation: None,
        }
    }
}

/// Clamp a reported confidence into `[0.0, 1.0]`; non-finite values
/// collapse to 0.0. Returns the clamped value and whether it changed.
pub(crate) fn clamp_confidence(raw: f32) -> (f32, bool) {
    if !raw.is_finite() {
        return (0.0, true);
    }
    let clamped = raw.clamp(0.0, 1.0);
    (clamped, clamped != raw)
}

/// The nodes of the workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowNode {
    Start,
    Retrieve,
    Summarize,
    Decide,
    Action,
    Escalate,
    End,
}

impl WorkflowNode {
    /// Stable string form used in checkpoints and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Retrieve => "retrieve",
            Self::Summarize => "summarize",
            Self::Decide => "decide",
            Self::Action => "action",
            Self::Escalate => "escalate",
            Self::End => "end",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Some(match s {
            "start" => Self::Start,
            "retrieve" => Self::Retrieve,
            "summarize" => Self::Summarize,
            "decide" => Self::Decide,
            "action" => Self::Action,
            "escalate" => Self::Escalate,
            "end" => Self::End,
            _ => return None,
        })
    }
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_string_forms_round_trip() {
        for node in [
            WorkflowNode::Start,
            WorkflowNode::Retrieve,
            WorkflowNode::Summarize,
            WorkflowNode::Decide,
            WorkflowNode::Action,
            WorkflowNode::Escalate,
            WorkflowNode::End,
        ] {
            assert_eq!(WorkflowNode::parse_str(node.as_str()), Some(node));
        }
        assert_eq!(WorkflowNode::parse_str("nonsense"), None);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(clamp_confidence(0.5), (0.5, false));
        assert_eq!(clamp_confidence(1.7), (1.0, true));
        assert_eq!(clamp_confidence(-0.2), (0.0, true));
        assert_eq!(clamp_confidence(f32::NAN), (0.0, true));
    }

    #[test]
    fn unknown_state_fields_are_rejected() {
        let json = r#"{"query":"q","bogus_field":1}"#;
        assert!(serde_json::from_str::<GraphState>(json).is_err());
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = GraphState::new("why is the sky blue");
        state.documents = vec!["rayleigh scattering".into()];
        state.summary = "scattering".into();
        state.confidence = 0.83;
        state.action = Some("respond: scattering".into());
        state.iteration_count = 4;

        let json = serde_json::to_string(&state).unwrap();
        let back: GraphState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
