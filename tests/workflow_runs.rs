//! End-to-end workflow runs: routing, retries, escalation, and resume.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    test_config, FailingEmbedder, FailingResolver, FlakyGenerator, HashEmbedder,
    ScriptedGenerator, StalledGenerator,
};
use ragline::{
    CheckpointStatus, CheckpointStore, EscalationReason, GraphState, InMemoryCheckpointStore,
    RagConfig, WorkflowError, WorkflowNode, HUMAN_REVIEW_ACTION,
};

#[tokio::test]
async fn confident_run_takes_the_action_path() {
    let config = test_config();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("blue light scatters most", 0.9)),
        Arc::clone(&store) as _,
    )
    .await;

    let report = workflow.run("why is the sky blue").await.unwrap();

    assert_eq!(
        report.path,
        [
            WorkflowNode::Retrieve,
            WorkflowNode::Summarize,
            WorkflowNode::Decide,
            WorkflowNode::Action,
        ]
    );
    let state = &report.final_state;
    assert_eq!(state.action.as_deref(), Some("respond: blue light scatters most"));
    assert_eq!(state.escalation, None);
    assert_eq!(state.iteration_count, 4);
    assert!(!state.documents.is_empty());

    let history = store.history(&report.run_id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|cp| cp.status == CheckpointStatus::Ok));
    // The retrieve checkpoint already carries documents but no summary yet.
    assert!(!history[0].state.documents.is_empty());
    assert!(history[0].state.summary.is_empty());
}

#[tokio::test]
async fn confidence_at_threshold_escalates_and_just_above_acts() {
    for (confidence, expect_action) in [(0.70f32, false), (0.71f32, true)] {
        let config = test_config();
        let workflow = common::pipeline(
            &config,
            Arc::new(HashEmbedder::new(16)),
            Arc::new(ScriptedGenerator::new("summary", confidence)),
            Arc::new(InMemoryCheckpointStore::new()),
        )
        .await;

        let report = workflow.run("query").await.unwrap();
        let state = &report.final_state;
        if expect_action {
            assert_eq!(state.action.as_deref(), Some("respond: summary"));
            assert_eq!(state.escalation, None);
        } else {
            assert_eq!(state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
            assert_eq!(state.escalation, Some(EscalationReason::LowConfidence));
            assert_eq!(report.path.last(), Some(&WorkflowNode::Escalate));
        }
    }
}

#[tokio::test]
async fn exhausted_generation_retries_escalate_without_raising() {
    let config = test_config();
    let generator = Arc::new(FlakyGenerator::always_failing(true));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::clone(&generator) as _,
        Arc::clone(&store) as _,
    )
    .await;

    let report = workflow.run("query").await.unwrap();

    assert_eq!(generator.attempts.load(Ordering::SeqCst), config.retry_max_attempts);
    let state = &report.final_state;
    assert_eq!(state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
    assert_eq!(state.escalation, Some(EscalationReason::GenerationFailed));

    let history = store.history(&report.run_id).await.unwrap();
    let summarize = history
        .iter()
        .find(|cp| cp.node == WorkflowNode::Summarize)
        .unwrap();
    assert_eq!(summarize.status, CheckpointStatus::Failed);
    assert_eq!(history.last().unwrap().status, CheckpointStatus::Escalated);
}

#[tokio::test]
async fn non_retriable_failure_is_not_retried() {
    let config = test_config();
    let generator = Arc::new(FlakyGenerator::always_failing(false));
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::clone(&generator) as _,
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(generator.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.final_state.escalation,
        Some(EscalationReason::GenerationFailed)
    );
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() {
    let config = RagConfig::builder()
        .retry_max_attempts(3)
        .retry_backoff_ms(1)
        .top_k(2)
        .build()
        .unwrap();
    let generator = Arc::new(FlakyGenerator::failing_times(2));
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::clone(&generator) as _,
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(generator.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(report.final_state.escalation, None);
    assert_eq!(
        report.final_state.action.as_deref(),
        Some("respond: recovered on attempt 3")
    );
}

#[tokio::test]
async fn retrieval_failure_routes_straight_to_escalate() {
    let config = test_config();
    let embedder = Arc::new(FailingEmbedder::new(true));
    let workflow = common::pipeline(
        &config,
        Arc::clone(&embedder) as _,
        Arc::new(ScriptedGenerator::new("unused", 0.9)),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(embedder.attempts.load(Ordering::SeqCst), config.retry_max_attempts);
    assert_eq!(
        report.path,
        [WorkflowNode::Retrieve, WorkflowNode::Escalate]
    );
    assert_eq!(
        report.final_state.escalation,
        Some(EscalationReason::RetrievalFailed)
    );
    assert_eq!(report.final_state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
}

#[tokio::test]
async fn stalled_call_hits_the_timeout_and_escalates() {
    let config = RagConfig::builder()
        .retry_max_attempts(2)
        .retry_backoff_ms(1)
        .call_timeout_ms(20)
        .top_k(2)
        .build()
        .unwrap();
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(StalledGenerator),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(
        report.final_state.escalation,
        Some(EscalationReason::GenerationFailed)
    );
    assert_eq!(report.final_state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
}

#[tokio::test]
async fn failed_action_resolution_escalates() {
    let config = test_config();
    let workflow = common::pipeline_with_resolver(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("summary", 0.9)),
        Arc::new(FailingResolver),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(
        report.final_state.escalation,
        Some(EscalationReason::ActionFailed)
    );
    assert_eq!(report.final_state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
}

#[tokio::test]
async fn out_of_range_confidence_is_clamped() {
    let config = test_config();
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("overconfident", 1.7)),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    assert_eq!(report.final_state.confidence, 1.0);
    assert_eq!(report.final_state.escalation, None);
}

#[tokio::test]
async fn iteration_limit_forces_escalation() {
    let config = RagConfig::builder()
        .max_iterations(2)
        .retry_backoff_ms(1)
        .top_k(2)
        .build()
        .unwrap();
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("summary", 0.99)),
        Arc::new(InMemoryCheckpointStore::new()),
    )
    .await;

    let report = workflow.run("query").await.unwrap();
    let state = &report.final_state;
    assert_eq!(state.escalation, Some(EscalationReason::MaxIterationsExceeded));
    assert_eq!(state.action.as_deref(), Some(HUMAN_REVIEW_ACTION));
    assert_eq!(report.path.last(), Some(&WorkflowNode::Escalate));
    // Two regular transitions plus the forced escalation.
    assert_eq!(state.iteration_count, 3);
}

#[tokio::test]
async fn interrupted_run_resumes_from_latest_checkpoint() {
    let config = test_config();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("resumed summary", 0.9)),
        Arc::clone(&store) as _,
    )
    .await;

    // Simulate a crash after RETRIEVE: only its checkpoint exists.
    let mut state = GraphState::new("why is the sky blue");
    state.documents = vec!["scattering text".into()];
    state.iteration_count = 1;
    store
        .save("run-42", WorkflowNode::Retrieve, &state, CheckpointStatus::Ok)
        .await
        .unwrap();

    let report = workflow.resume("run-42").await.unwrap();

    assert_eq!(report.run_id, "run-42");
    assert_eq!(
        report.path,
        [WorkflowNode::Summarize, WorkflowNode::Decide, WorkflowNode::Action]
    );
    assert_eq!(
        report.final_state.action.as_deref(),
        Some("respond: resumed summary")
    );
    // Retrieved documents from before the crash survive the resume.
    assert_eq!(report.final_state.documents, vec!["scattering text".to_string()]);

    let history = store.history("run-42").await.unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn resume_rejects_unknown_and_completed_runs() {
    let config = test_config();
    let store = Arc::new(InMemoryCheckpointStore::new());
    let workflow = common::pipeline(
        &config,
        Arc::new(HashEmbedder::new(16)),
        Arc::new(ScriptedGenerator::new("summary", 0.9)),
        Arc::clone(&store) as _,
    )
    .await;

    assert!(matches!(
        workflow.resume("never-ran").await,
        Err(WorkflowError::UnknownRun { .. })
    ));

    let report = workflow.run_with_id("done".into(), "query").await.unwrap();
    assert!(report.final_state.action.is_some());
    assert!(matches!(
        workflow.resume("done").await,
        Err(WorkflowError::RunAlreadyComplete { .. })
    ));
}
