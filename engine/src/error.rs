use crate::supervisor::RoundPhase;

/// Protocol misuse of the orchestrator.
///
/// Late or stale messages are not errors; they yield `Directive::Ignored`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("a turn is already in flight ({phase:?})")]
    TurnInFlight { phase: RoundPhase },
    #[error("a turn needs at least one tool call")]
    EmptyToolBatch,
    #[error("no permission request is pending")]
    NotAwaitingPermission,
}
