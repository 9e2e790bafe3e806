//! Whole turns through the async driver.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use toolgate_engine::{
    ApprovalPolicy, OrchestratorSettings, PermissionDecision, Retention, RoundPhase,
    ScriptedExecutor, ScriptedRound, ToolOrchestrator, TranscriptEvent, TurnDriver, TurnOutcome,
};

use crate::common::{
    QueuedOperator, RecordingSink, SilentOperator, SlowExecutor, name, record, search_call, turn,
};

fn strict(max: u32) -> OrchestratorSettings {
    OrchestratorSettings::new(ApprovalPolicy::strict(), max)
}

fn follow_up_round() -> ScriptedRound {
    ScriptedRound {
        chunks: vec!["partial result".to_string()],
        has_more_steps: true,
        next_tool_calls: vec![search_call("follow-up")],
        ..ScriptedRound::default()
    }
}

#[tokio::test]
async fn approved_call_runs_and_grant_expires_with_turn() {
    let mut orchestrator = ToolOrchestrator::new(record("conv-1", &[]), strict(5));
    let operator = QueuedOperator::new([PermissionDecision::approve_once()]);
    let executor = Arc::new(ScriptedExecutor::new([
        follow_up_round(),
        ScriptedRound {
            chunks: vec!["done".to_string()],
            ..ScriptedRound::default()
        },
    ]));
    let driver = TurnDriver::new(executor.clone(), operator.clone());
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    let TurnOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.total_steps(), 2);
    // The second round reused the turn's grant.
    assert_eq!(operator.times_asked(), 1);
    assert_eq!(executor.remaining(), 0);
    assert_eq!(sink.chunks, vec!["partial result", "done"]);
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::RoundCompleted { .. })),
        2
    );
    assert!(!orchestrator.ledger().is_allowed(&name("search.web")));
    assert_eq!(orchestrator.phase(), RoundPhase::Idle);
}

#[tokio::test]
async fn ceiling_is_reported_once() {
    let mut orchestrator =
        ToolOrchestrator::new(record("conv-2", &["search.web"]), strict(3));
    let executor = Arc::new(ScriptedExecutor::new(
        std::iter::repeat_with(follow_up_round).take(4),
    ));
    let driver = TurnDriver::new(executor.clone(), QueuedOperator::new([]));
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::CeilingReached(ref s) if s.total_steps() == 3));
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::CeilingReached { max: 3 })),
        1
    );
    assert_eq!(executor.remaining(), 1);
}

#[tokio::test]
async fn cancel_during_execution_aborts_executor() {
    let mut orchestrator =
        ToolOrchestrator::new(record("conv-3", &["search.web"]), strict(5));
    let executor = SlowExecutor::new(Duration::from_millis(300));
    let driver = TurnDriver::new(executor.clone(), QueuedOperator::new([]));
    let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = cancel_tx.send(()).await;
    });

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert_eq!(executor.started.load(Ordering::SeqCst), 1);

    // Give the aborted round time it would have needed to finish.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!executor.finished.load(Ordering::SeqCst));
    assert!(sink.chunks.is_empty());
    assert!(matches!(sink.events.last(), Some(TranscriptEvent::Cancelled)));
    assert!(
        orchestrator
            .transcript()
            .iter()
            .all(|entry| entry.retention() == Retention::Persistent)
    );
    assert_eq!(orchestrator.ledger().ephemeral_len(), 0);
    assert!(!orchestrator.is_turn_active());
}

#[tokio::test]
async fn cancel_during_permission_wait_clears_turn() {
    let mut orchestrator = ToolOrchestrator::new(record("conv-4", &[]), strict(5));
    let executor = SlowExecutor::new(Duration::from_millis(10));
    let driver = TurnDriver::new(executor.clone(), Arc::new(SilentOperator));
    let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = cancel_tx.send(()).await;
    });

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(outcome, TurnOutcome::Cancelled);
    assert_eq!(executor.started.load(Ordering::SeqCst), 0);
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::PermissionRequested { .. })),
        1
    );
    assert!(orchestrator.transcript().iter().all(|entry| matches!(
        entry.event,
        TranscriptEvent::Cancelled
    )));
}

#[tokio::test]
async fn denial_never_reaches_executor() {
    let mut orchestrator = ToolOrchestrator::new(record("conv-5", &[]), strict(5));
    let executor = SlowExecutor::new(Duration::from_millis(10));
    let driver = TurnDriver::new(
        executor.clone(),
        QueuedOperator::new([PermissionDecision::deny()]),
    );
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Denied {
            tool: name("search.web")
        }
    );
    assert_eq!(executor.started.load(Ordering::SeqCst), 0);
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::PermissionDenied { .. })),
        1
    );
}

#[tokio::test]
async fn always_allow_produces_persistence_update() {
    let mut orchestrator = ToolOrchestrator::new(record("conv-6", &[]), strict(5));
    let operator = QueuedOperator::new([PermissionDecision::always_allow()]);
    let driver = TurnDriver::new(
        Arc::new(ScriptedExecutor::new([ScriptedRound::default(), ScriptedRound::default()])),
        operator.clone(),
    );
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    for id in ["c1", "c2"] {
        let outcome = driver
            .drive(
                &mut orchestrator,
                turn(vec![search_call(id)]),
                &mut cancel_rx,
                &mut sink,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::Completed(_)));
    }

    assert_eq!(operator.times_asked(), 1);
    let update = orchestrator.take_persistence_update().unwrap();
    assert_eq!(update.allowed_tools, vec![name("search.web")]);
    assert!(orchestrator.take_persistence_update().is_none());
}

#[tokio::test]
async fn closed_cancel_channel_is_not_a_cancellation() {
    let mut orchestrator =
        ToolOrchestrator::new(record("conv-7", &["search.web"]), strict(5));
    let driver = TurnDriver::new(
        Arc::new(ScriptedExecutor::new([ScriptedRound {
            delay_ms: 20,
            ..ScriptedRound::default()
        }])),
        QueuedOperator::new([]),
    );
    let (cancel_tx, mut cancel_rx) = mpsc::channel::<()>(1);
    drop(cancel_tx);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed(_)));
}

#[tokio::test]
async fn executor_failure_ends_turn_with_error() {
    let mut orchestrator =
        ToolOrchestrator::new(record("conv-8", &["search.web"]), strict(5));
    let driver = TurnDriver::new(
        Arc::new(ScriptedExecutor::new([ScriptedRound {
            error: Some("plugin exited".to_string()),
            ..ScriptedRound::default()
        }])),
        QueuedOperator::new([]),
    );
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    let TurnOutcome::Errored { message } = outcome else {
        panic!("expected error, got {outcome:?}");
    };
    assert!(message.contains("plugin exited"));
    assert!(matches!(
        sink.events.last(),
        Some(TranscriptEvent::Errored { .. })
    ));
    assert!(!orchestrator.is_turn_active());
}

#[tokio::test]
async fn executor_failure_after_approval_clears_grant() {
    let mut orchestrator = ToolOrchestrator::new(record("conv-9", &[]), strict(5));
    let driver = TurnDriver::new(
        Arc::new(ScriptedExecutor::new([ScriptedRound {
            error: Some("plugin exited".to_string()),
            ..ScriptedRound::default()
        }])),
        QueuedOperator::new([PermissionDecision::approve_once()]),
    );
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            turn(vec![search_call("c1")]),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Errored { .. }));
    assert_eq!(orchestrator.ledger().ephemeral_len(), 0);
    assert!(!orchestrator.ledger().is_allowed(&name("search.web")));
    assert_eq!(orchestrator.phase(), RoundPhase::Idle);
}
