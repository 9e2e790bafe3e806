//! Config file + scenario file, end to end.

use std::fs;
use std::sync::Arc;

use tempfile::tempdir;
use tokio::sync::mpsc;
use toolgate_engine::{
    OrchestratorSettings, PermissionDecision, Scenario, ToolOrchestrator, ToolgateConfig,
    TranscriptEvent, TurnDriver, TurnOutcome,
};

use crate::common::{QueuedOperator, RecordingSink, name};

const SCENARIO: &str = r#"{
    "conversation": {"id": "weather", "allowed_tools": []},
    "context": [{"role": "assistant", "content": "I need today's forecast."}],
    "tool_calls": [
        {"id": "c1", "name": "search.web", "arguments": {"query": "Lisbon forecast"}}
    ],
    "rounds": [
        {
            "chunks": ["Sunny, 24C"],
            "has_more_steps": true,
            "next_tool_calls": [
                {"id": "c2", "name": "fs.write", "arguments": {"path": "/tmp/forecast.txt"}}
            ]
        },
        {"chunks": ["saved"], "summary": "wrote forecast"}
    ]
}"#;

async fn run(
    config_toml: &str,
    decisions: Vec<PermissionDecision>,
) -> (TurnOutcome, RecordingSink, usize, ToolOrchestrator) {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let scenario_path = dir.path().join("scenario.json");
    fs::write(&config_path, config_toml).unwrap();
    fs::write(&scenario_path, SCENARIO).unwrap();

    let config = ToolgateConfig::load_from(&config_path).unwrap();
    let settings = OrchestratorSettings::from_config(Some(&config));
    let scenario = Scenario::load(&scenario_path).unwrap();

    let mut orchestrator = ToolOrchestrator::new(scenario.conversation.clone(), settings);
    let operator = QueuedOperator::new(decisions);
    let driver = TurnDriver::new(Arc::new(scenario.executor()), operator.clone());
    let (_cancel_tx, mut cancel_rx) = mpsc::channel(1);
    let mut sink = RecordingSink::default();

    let outcome = driver
        .drive(
            &mut orchestrator,
            scenario.turn_input(),
            &mut cancel_rx,
            &mut sink,
        )
        .await
        .unwrap();
    (outcome, sink, operator.times_asked(), orchestrator)
}

#[tokio::test]
async fn approval_disabled_runs_without_prompting() {
    let (outcome, sink, asked, _) = run("[tools]\nrequire_approval = false\n", Vec::new()).await;

    let TurnOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(asked, 0);
    assert_eq!(summary.total_steps(), 2);
    assert_eq!(summary.steps[0].purpose, "I need today's forecast");
    assert_eq!(summary.steps[1].purpose, "Access file: /tmp/forecast.txt");
    assert_eq!(sink.chunks, vec!["Sunny, 24C", "saved"]);
}

#[tokio::test]
async fn configured_allowlist_only_prompts_for_the_rest() {
    let config = r#"
[tools.approval]
allowlist = ["search.web"]
"#;
    let (outcome, sink, asked, _) = run(config, vec![PermissionDecision::approve_once()]).await;

    assert!(matches!(outcome, TurnOutcome::Completed(_)));
    assert_eq!(asked, 1);
    let prompted: Vec<_> = sink
        .events
        .iter()
        .filter_map(|event| match event {
            TranscriptEvent::PermissionRequested { tool_name, .. } => Some(tool_name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(prompted, vec![name("fs.write")]);
}

#[tokio::test]
async fn single_step_mode_completes_after_first_round() {
    let config = "[tools]\nrequire_approval = false\nenable_multi_step = false\n";
    let (outcome, sink, _, _) = run(config, Vec::new()).await;

    let TurnOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.total_steps(), 1);
    assert!(!summary.max_reached);
    assert_eq!(sink.chunks, vec!["Sunny, 24C"]);
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::CeilingReached { .. })),
        0
    );
}

#[tokio::test]
async fn denied_follow_up_keeps_completed_step() {
    let (outcome, sink, asked, orchestrator) = run(
        "",
        vec![PermissionDecision::approve_once(), PermissionDecision::deny()],
    )
    .await;

    assert_eq!(
        outcome,
        TurnOutcome::Denied {
            tool: name("fs.write")
        }
    );
    assert_eq!(asked, 2);
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::RoundCompleted { .. })),
        1
    );
    assert_eq!(
        sink.count(|e| matches!(e, TranscriptEvent::PermissionDenied { .. })),
        1
    );
    // The first round's approve-once grant ends with the turn.
    assert_eq!(orchestrator.ledger().ephemeral_len(), 0);
    assert!(!orchestrator.ledger().is_allowed(&name("search.web")));
    assert!(!orchestrator.ledger().is_allowed(&name("fs.write")));
    assert!(!orchestrator.is_turn_active());
}
