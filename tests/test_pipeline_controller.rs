//! Integration tests for the pipeline controller
//!
//! Drives full runs through the public handle with mock collaborators and
//! checks the state machine, the store and the event log.

use agentflow::audit::AuditWriter;
use agentflow::pipeline::{
    AgentCatalog, AgentName, PipelineEvent, PipelineEventKind, PipelineEventPayload,
    PipelineHandle, PipelineInputs, PipelineStatus, ReviewOutcome,
};
use agentflow::review::ReviewSubmission;
use agentflow::testing::{
    task_output, wait_for_event, MockAgentInvoker, MockPipeline, MockValidationService,
};
use agentflow::PipelineError;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const WAIT: Duration = Duration::from_secs(5);

fn agent(name: &str) -> AgentName {
    AgentName::new(name).unwrap()
}

fn sequence(names: &[&str]) -> Vec<AgentName> {
    names.iter().map(|n| agent(n)).collect()
}

fn inputs(names: &[&str]) -> PipelineInputs {
    PipelineInputs::new(
        "Inventory Service",
        "Track stock levels per warehouse",
        "Existing Postgres database",
        sequence(names),
    )
}

async fn await_review(events: &mut broadcast::Receiver<PipelineEvent>, expected: &str) {
    let event = wait_for_event(events, PipelineEventKind::AwaitingReview, WAIT)
        .await
        .expect("agent output reached review");
    assert_eq!(event.agent(), Some(&agent(expected)));
}

async fn submit_unchanged(handle: &PipelineHandle, name: &str) -> ReviewOutcome {
    handle
        .submit_review(agent(name), ReviewSubmission::FromSurface)
        .await
        .unwrap()
}

/// Kinds excluding per-task validation events
fn milestones(kinds: Vec<PipelineEventKind>) -> Vec<PipelineEventKind> {
    kinds
        .into_iter()
        .filter(|k| {
            !matches!(
                k,
                PipelineEventKind::TaskValidated | PipelineEventKind::TaskValidationFailed
            )
        })
        .collect()
}

#[tokio::test]
async fn test_successful_run_completes_with_events_in_order() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("KnowledgeBase"),
        task_output([("glossary", json!({"SKU": "stock keeping unit"}))]),
    );
    invoker.respond(
        &agent("Requirements"),
        task_output([
            ("stories", json!(["As a clerk I can adjust stock"])),
            ("constraints", json!(["p99 < 200ms"])),
        ]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle
        .start(inputs(&["KnowledgeBase", "Requirements"]))
        .await
        .unwrap();

    await_review(&mut events, "KnowledgeBase").await;
    let outcome = submit_unchanged(&handle, "KnowledgeBase").await;
    assert_eq!(
        outcome,
        ReviewOutcome::Advanced {
            finalized: agent("KnowledgeBase"),
            next: agent("Requirements"),
        }
    );

    await_review(&mut events, "Requirements").await;
    let outcome = submit_unchanged(&handle, "Requirements").await;
    assert_eq!(outcome, ReviewOutcome::Completed);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Completed);
    assert_eq!(snapshot.outputs.len(), 2);

    use PipelineEventKind::*;
    assert_eq!(
        milestones(mocks.recorder.kinds()),
        vec![
            RunStarted,
            DispatchStarted,
            AwaitingReview,
            AgentValidated,
            DispatchStarted,
            AwaitingReview,
            AgentValidated,
            RunCompleted,
        ]
    );
    assert_eq!(mocks.recorder.count(TaskValidated), 3);
}

#[tokio::test]
async fn test_invocation_failure_halts_run() {
    let invoker = MockAgentInvoker::new();
    invoker.fail(&agent("Requirements"), "model overloaded");
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();

    let failed = wait_for_event(&mut events, PipelineEventKind::RunFailed, WAIT)
        .await
        .expect("run failed");
    assert_eq!(failed.agent(), Some(&agent("Requirements")));

    let snapshot = handle.snapshot().await.unwrap();
    match snapshot.status {
        PipelineStatus::Failed { index, reason } => {
            assert_eq!(index, 0);
            assert!(reason.contains("model overloaded"), "reason: {reason}");
        }
        other => panic!("expected Failed, got {other}"),
    }
    assert!(snapshot.outputs.is_empty());
    assert_eq!(mocks.recorder.count(PipelineEventKind::RunFailed), 1);
    assert_eq!(mocks.recorder.count(PipelineEventKind::AwaitingReview), 0);
}

#[tokio::test]
async fn test_reviewed_output_reaches_dependent_payload_verbatim() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["draft story"]))]),
    );
    invoker.respond(
        &agent("Architecture"),
        task_output([("modules", json!(["api", "storage"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle
        .start(inputs(&["Requirements", "Architecture"]))
        .await
        .unwrap();
    await_review(&mut events, "Requirements").await;

    let reviewed = task_output([(
        "stories",
        json!([{"id": 1, "text": "As a clerk I can adjust stock", "tags": ["core"]}]),
    )]);
    handle
        .submit_review(
            agent("Requirements"),
            ReviewSubmission::Structured(reviewed.clone()),
        )
        .await
        .unwrap();
    await_review(&mut events, "Architecture").await;

    let payloads = mocks.invoker.payloads();
    assert_eq!(payloads.len(), 2);

    // KnowledgeBase is not part of this run, so nothing is required from it
    assert!(payloads[0].dependencies.is_empty());

    let architecture = &payloads[1];
    assert_eq!(architecture.agent, agent("Architecture"));
    assert_eq!(architecture.title, "Inventory Service");
    assert_eq!(architecture.dependencies.len(), 1);
    assert_eq!(architecture.dependencies[&agent("Requirements")], reviewed);
}

#[tokio::test]
async fn test_malformed_review_keeps_agent_at_checkpoint() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    mocks
        .surface
        .set_content(&agent("Requirements"), "{\"stories\": [\"s1\",");
    let err = handle
        .submit_review(agent("Requirements"), ReviewSubmission::FromSurface)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedReview { .. }));

    let err = handle
        .submit_review(agent("Requirements"), ReviewSubmission::Text("[1, 2]".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MalformedReview { .. }));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::AwaitingReview { index: 0 });
    assert_eq!(mocks.recorder.count(PipelineEventKind::ReviewRejected), 2);
    assert!(mocks.validator.calls().is_empty());

    mocks.surface.set_content(
        &agent("Requirements"),
        r#"{"stories": ["s1", "s2 added by reviewer"]}"#,
    );
    let outcome = submit_unchanged(&handle, "Requirements").await;
    assert_eq!(outcome, ReviewOutcome::Completed);

    let snapshot = handle.snapshot().await.unwrap();
    let stored = snapshot.outputs.get(&agent("Requirements")).unwrap();
    assert_eq!(stored["stories"], json!(["s1", "s2 added by reviewer"]));
    assert_eq!(mocks.invoker.invocations_for(&agent("Requirements")), 1);
}

#[tokio::test]
async fn test_failed_task_holds_checkpoint_until_corrected() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    invoker.respond(
        &agent("Architecture"),
        task_output([
            ("modules", json!(["api", "storage"])),
            ("apis", json!("TBD")),
        ]),
    );
    let mocks = MockPipeline::new(invoker);
    mocks.validator.reject_value(
        &agent("Architecture"),
        "apis",
        json!("TBD"),
        "apis must be a list of endpoints",
    );
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle
        .start(inputs(&["Requirements", "Architecture"]))
        .await
        .unwrap();
    await_review(&mut events, "Requirements").await;
    submit_unchanged(&handle, "Requirements").await;
    await_review(&mut events, "Architecture").await;
    mocks.recorder.clear();

    let outcome = submit_unchanged(&handle, "Architecture").await;
    match outcome {
        ReviewOutcome::Pending {
            failed,
            pending_tasks,
            submitted,
        } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].task, "apis");
            assert!(failed[0].message.contains("list of endpoints"));
            assert_eq!(pending_tasks, vec!["apis".to_string()]);
            assert!(submitted);
        }
        other => panic!("expected Pending, got {other:?}"),
    }

    let validated: Vec<_> = mocks
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e.payload {
            PipelineEventPayload::TaskValidated { task, .. } => Some(format!("ok:{task}")),
            PipelineEventPayload::TaskValidationFailed { task, .. } => {
                Some(format!("failed:{task}"))
            }
            _ => None,
        })
        .collect();
    assert_eq!(validated, vec!["ok:modules", "failed:apis"]);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::AwaitingReview { index: 1 });
    assert_eq!(snapshot.pending_tasks, vec!["apis".to_string()]);
    assert!(!snapshot.outputs.contains(&agent("Architecture")));

    let outcome = handle
        .correct_task(agent("Architecture"), "apis", json!(["GET /stock"]))
        .await
        .unwrap();
    assert_eq!(outcome, ReviewOutcome::Completed);

    // The acknowledged task was not sent again
    assert_eq!(mocks.validator.calls_for(&agent("Architecture"), "modules"), 1);
    assert_eq!(mocks.validator.calls_for(&agent("Architecture"), "apis"), 2);

    let snapshot = handle.snapshot().await.unwrap();
    let stored = snapshot.outputs.get(&agent("Architecture")).unwrap();
    assert_eq!(stored["apis"], json!(["GET /stock"]));
}

#[tokio::test]
async fn test_resubmission_only_revalidates_unacknowledged_values() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"])), ("risks", json!([]))]),
    );
    let mocks = MockPipeline::new(invoker);
    mocks
        .validator
        .reject_task(&agent("Requirements"), "risks", "at least one risk required");
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    let first = submit_unchanged(&handle, "Requirements").await;
    assert!(matches!(first, ReviewOutcome::Pending { .. }));

    mocks.validator.accept_task(&agent("Requirements"), "risks");
    let second = submit_unchanged(&handle, "Requirements").await;
    assert_eq!(second, ReviewOutcome::Completed);

    assert_eq!(mocks.validator.calls_for(&agent("Requirements"), "stories"), 1);
    assert_eq!(mocks.validator.calls_for(&agent("Requirements"), "risks"), 2);
}

#[tokio::test]
async fn test_edited_task_loses_its_acknowledgment() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"])), ("risks", json!([]))]),
    );
    let mocks = MockPipeline::new(invoker);
    mocks
        .validator
        .reject_task(&agent("Requirements"), "risks", "at least one risk required");
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;
    submit_unchanged(&handle, "Requirements").await;

    mocks.validator.accept_task(&agent("Requirements"), "risks");
    mocks.surface.set_content(
        &agent("Requirements"),
        r#"{"stories": ["s1", "s2"], "risks": ["vendor lock-in"]}"#,
    );
    let outcome = submit_unchanged(&handle, "Requirements").await;
    assert_eq!(outcome, ReviewOutcome::Completed);

    // stories changed after its acknowledgment, so it was validated again
    assert_eq!(mocks.validator.calls_for(&agent("Requirements"), "stories"), 2);
}

#[tokio::test]
async fn test_correction_before_submission_does_not_finalize() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    let outcome = handle
        .correct_task(agent("Requirements"), "stories", json!(["s1", "s2"]))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReviewOutcome::Pending {
            failed: vec![],
            pending_tasks: vec![],
            submitted: false,
        }
    );
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::AwaitingReview { index: 0 });

    let err = handle
        .correct_task(agent("Requirements"), "missing", json!(1))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownTask { .. }));
}

#[tokio::test]
async fn test_correcting_finalized_agent_updates_store_after_acknowledgment() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("KnowledgeBase"),
        task_output([("glossary", json!({"SKU": "unit"}))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["KnowledgeBase"])).await.unwrap();
    await_review(&mut events, "KnowledgeBase").await;
    assert_eq!(
        submit_unchanged(&handle, "KnowledgeBase").await,
        ReviewOutcome::Completed
    );
    let calls_after_review = mocks.validator.calls().len();

    // Identical value: nothing to send
    let outcome = handle
        .correct_task(agent("KnowledgeBase"), "glossary", json!({"SKU": "unit"}))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReviewOutcome::Corrected {
            agent: agent("KnowledgeBase"),
            task: "glossary".into(),
            changed: false,
        }
    );
    assert_eq!(mocks.validator.calls().len(), calls_after_review);

    // Rejected value leaves the store untouched
    mocks.validator.reject_value(
        &agent("KnowledgeBase"),
        "glossary",
        json!({}),
        "glossary is empty",
    );
    let err = handle
        .correct_task(agent("KnowledgeBase"), "glossary", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation { .. }));
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.outputs.get(&agent("KnowledgeBase")).unwrap()["glossary"],
        json!({"SKU": "unit"})
    );

    let outcome = handle
        .correct_task(
            agent("KnowledgeBase"),
            "glossary",
            json!({"SKU": "stock keeping unit"}),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ReviewOutcome::Corrected { changed: true, .. }));
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Completed);
    assert_eq!(
        snapshot.outputs.get(&agent("KnowledgeBase")).unwrap()["glossary"],
        json!({"SKU": "stock keeping unit"})
    );
}

#[tokio::test]
async fn test_abandon_discards_in_flight_invocation() {
    let invoker = MockAgentInvoker::new().with_delay(Duration::from_millis(200));
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    wait_for_event(&mut events, PipelineEventKind::DispatchStarted, WAIT)
        .await
        .expect("dispatch started");

    handle.abandon().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Idle);
    assert!(snapshot.run_id.is_none());
    assert!(mocks.surface.presented().is_empty());
    assert_eq!(mocks.recorder.count(PipelineEventKind::AwaitingReview), 0);
    assert_eq!(mocks.recorder.count(PipelineEventKind::RunAbandoned), 1);
}

#[tokio::test]
async fn test_retry_redispatches_failed_agent() {
    let invoker = MockAgentInvoker::new();
    invoker
        .fail(&agent("Requirements"), "connection reset")
        .respond(
            &agent("Requirements"),
            task_output([("stories", json!(["s1"]))]),
        );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    wait_for_event(&mut events, PipelineEventKind::RunFailed, WAIT)
        .await
        .expect("first attempt failed");

    handle.retry().await.unwrap();
    await_review(&mut events, "Requirements").await;
    assert_eq!(
        submit_unchanged(&handle, "Requirements").await,
        ReviewOutcome::Completed
    );
    assert_eq!(mocks.invoker.invocations_for(&agent("Requirements")), 2);

    let err = handle.retry().await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));
}

#[tokio::test]
async fn test_surface_failure_fails_run() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    mocks.surface.fail_presenting(true);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    wait_for_event(&mut events, PipelineEventKind::RunFailed, WAIT)
        .await
        .expect("run failed");

    let snapshot = handle.snapshot().await.unwrap();
    assert!(matches!(snapshot.status, PipelineStatus::Failed { index: 0, .. }));
}

#[tokio::test]
async fn test_start_rejects_invalid_inputs() {
    let mocks = MockPipeline::new(MockAgentInvoker::new());
    let handle = mocks.controller(AgentCatalog::default()).spawn();

    let err = handle
        .start(inputs(&["Architecture", "Requirements"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidSequence { .. }));

    let err = handle.start(inputs(&["Deployer"])).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidSequence { .. }));

    let err = handle.start(inputs(&[])).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidSequence { .. }));

    let blank = PipelineInputs::new("  ", "", "", sequence(&["Requirements"]));
    let err = handle.start(blank).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput { .. }));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Idle);
    assert!(mocks.invoker.payloads().is_empty());
}

#[tokio::test]
async fn test_review_commands_rejected_outside_checkpoint() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("KnowledgeBase"),
        task_output([("glossary", json!({}))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    let err = handle
        .submit_review(agent("KnowledgeBase"), ReviewSubmission::FromSurface)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));

    handle
        .start(inputs(&["KnowledgeBase", "Requirements"]))
        .await
        .unwrap();
    await_review(&mut events, "KnowledgeBase").await;

    let err = handle
        .submit_review(agent("Requirements"), ReviewSubmission::FromSurface)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));

    let err = handle
        .correct_task(agent("Requirements"), "stories", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));

    let err = handle
        .correct_task(agent("Generator"), "code", json!([]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownAgent(_)));
}

#[tokio::test]
async fn test_start_over_abandons_active_run() {
    let invoker = MockAgentInvoker::new();
    invoker
        .respond(
            &agent("Requirements"),
            task_output([("stories", json!(["first"]))]),
        )
        .respond(
            &agent("Requirements"),
            task_output([("stories", json!(["second"]))]),
        );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    let first = handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    let second = handle.start(inputs(&["Requirements"])).await.unwrap();
    assert_ne!(first, second);
    await_review(&mut events, "Requirements").await;

    let abandoned: Vec<_> = mocks
        .recorder
        .events()
        .into_iter()
        .filter(|e| e.kind() == PipelineEventKind::RunAbandoned)
        .collect();
    assert_eq!(abandoned.len(), 1);
    assert_eq!(abandoned[0].run_id, first);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.run_id, Some(second));
    assert!(snapshot.outputs.is_empty());
}

#[tokio::test]
async fn test_completed_run_writes_audit_record() {
    let dir = TempDir::new().unwrap();
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("KnowledgeBase"),
        task_output([("glossary", json!({"SKU": "unit"}))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks
        .controller(AgentCatalog::default())
        .with_audit(AuditWriter::new(dir.path()))
        .spawn();
    let mut events = handle.subscribe();

    let run_id = handle.start(inputs(&["KnowledgeBase"])).await.unwrap();
    await_review(&mut events, "KnowledgeBase").await;
    submit_unchanged(&handle, "KnowledgeBase").await;

    let path = dir
        .path()
        .join(format!("inventory-service-{run_id}.json"));
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(record["title"], json!("Inventory Service"));
    assert_eq!(
        record["outputs"]["KnowledgeBase"]["glossary"],
        json!({"SKU": "unit"})
    );
}

#[tokio::test]
async fn test_correction_under_review_survives_surface_submission() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"]))]),
    );
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    let outcome = handle
        .correct_task(agent("Requirements"), "stories", json!(["fixed"]))
        .await
        .unwrap();
    assert!(matches!(outcome, ReviewOutcome::Pending { submitted: false, .. }));

    let outcome = submit_unchanged(&handle, "Requirements").await;
    assert_eq!(outcome, ReviewOutcome::Completed);

    let snapshot = handle.snapshot().await.unwrap();
    let stored = snapshot.outputs.get(&agent("Requirements")).unwrap();
    assert_eq!(stored["stories"], json!(["fixed"]));

    // The corrected value kept its acknowledgment through the submission
    let calls: Vec<_> = mocks
        .validator
        .calls()
        .into_iter()
        .map(|(_, _, value)| value)
        .collect();
    assert_eq!(calls, vec![json!(["fixed"])]);
}

#[tokio::test]
async fn test_commands_served_while_validation_in_flight() {
    let invoker = MockAgentInvoker::new();
    invoker.respond(
        &agent("Requirements"),
        task_output([("stories", json!(["s1"])), ("risks", json!(["lock-in"]))]),
    );
    let mocks = MockPipeline::new(invoker)
        .with_validator(MockValidationService::new().with_delay(Duration::from_millis(300)));
    let handle = mocks.controller(AgentCatalog::default()).spawn();
    let mut events = handle.subscribe();

    handle.start(inputs(&["Requirements"])).await.unwrap();
    await_review(&mut events, "Requirements").await;

    let submitter = handle.clone();
    let submission = tokio::spawn(async move {
        submitter
            .submit_review(agent("Requirements"), ReviewSubmission::FromSurface)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = tokio::time::timeout(Duration::from_millis(150), handle.snapshot())
        .await
        .expect("snapshot answered during validation")
        .unwrap();
    assert_eq!(snapshot.status, PipelineStatus::AwaitingReview { index: 0 });

    let err = handle
        .correct_task(agent("Requirements"), "stories", json!(["s2"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState { .. }));

    tokio::time::timeout(Duration::from_millis(150), handle.abandon())
        .await
        .expect("abandon answered during validation")
        .unwrap();

    let result = submission.await.unwrap();
    assert!(matches!(result, Err(PipelineError::InvalidState { .. })));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Idle);
    assert_eq!(mocks.recorder.count(PipelineEventKind::AgentValidated), 0);
    assert_eq!(mocks.recorder.count(PipelineEventKind::TaskValidated), 0);
}

#[tokio::test]
async fn test_full_default_catalog_finalizes_every_agent() {
    let catalog = AgentCatalog::default();
    let order = catalog.default_sequence();
    let invoker = MockAgentInvoker::new();
    for name in &order {
        invoker.respond(
            name,
            task_output([("summary", json!(format!("{name} output")))]),
        );
    }
    let mocks = MockPipeline::new(invoker);
    let handle = mocks.controller(catalog.clone()).spawn();
    let mut events = handle.subscribe();

    let run_inputs = PipelineInputs::new("Inventory Service", "Track stock", "", order.clone());
    handle.start(run_inputs).await.unwrap();

    for (position, name) in order.iter().enumerate() {
        await_review(&mut events, name.as_str()).await;
        let outcome = submit_unchanged(&handle, name.as_str()).await;
        if position + 1 == order.len() {
            assert_eq!(outcome, ReviewOutcome::Completed);
        } else {
            assert!(matches!(outcome, ReviewOutcome::Advanced { .. }));
        }
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Completed);
    assert_eq!(snapshot.outputs.len(), 5);

    let payloads = mocks.invoker.payloads();
    assert_eq!(payloads.len(), 5);
    for payload in &payloads {
        let received: Vec<&AgentName> = payload.dependencies.keys().collect();
        assert_eq!(
            received,
            catalog.required_predecessors(&payload.agent, &order),
            "dependencies of {}",
            payload.agent
        );
        for (dep, output) in &payload.dependencies {
            assert_eq!(Some(output), snapshot.outputs.get(dep));
        }
    }
}
