//! Core engine for Toolgate - tool-call orchestration and permissions.
//!
//! This crate contains the per-conversation state machine that decides which
//! tool calls may run, bounds multi-step tool use, and unwinds cleanly on
//! denial, error or cancellation. Rendering, inference and the tool transport
//! live outside; they meet the engine at the traits in [`executor`].
//!
//! ```text
//! ToolOrchestrator
//!   ├── PermissionGate        (stateless: policy + ledger -> verdict)
//!   ├── AllowListLedger       (persistent + ephemeral grants)
//!   ├── IterationController   (rounds per turn, step history)
//!   ├── CancellationSupervisor(round tokens, abort handles)
//!   └── Transcript            (retention-tagged events)
//!
//! TurnDriver ── spawns executor rounds / operator prompts ── mpsc ──> ToolOrchestrator
//! ```

mod config;
mod driver;
mod error;
pub mod executor;
mod gate;
mod iteration;
mod ledger;
mod orchestrator;
mod scripted;
mod settings;
mod supervisor;
mod transcript;

pub use config::{ConfigError, ToolApprovalConfig, ToolgateConfig, ToolsConfig, config_path};
pub use driver::TurnDriver;
pub use error::OrchestratorError;
pub use executor::{
    ExecFut, ExecutorError, OperatorPrompt, PromptFut, RoundOutput, ToolExecutor, TranscriptSink,
};
pub use gate::{
    ArgumentDetail, GateVerdict, PermissionGate, PermissionRequest, argument_details,
    extract_purpose, extract_step_purpose,
};
pub use iteration::{
    IterationController, IterationStep, IterationSummary, IterationVerdict, NextRound,
    NotStarted, RoundCompletion,
};
pub use ledger::AllowListLedger;
pub use orchestrator::{
    Directive, ExecutionRequest, PersistenceUpdate, ToolOrchestrator, TurnInput, TurnOutcome,
};
pub use scripted::{Scenario, ScenarioError, ScriptedExecutor, ScriptedRound};
pub use settings::{ApprovalPolicy, DEFAULT_MAX_ITERATIONS, OrchestratorSettings};
pub use supervisor::{CancelOutcome, CancellationSupervisor, RoundEnd, RoundPhase, RoundToken};
pub use transcript::{
    Retention, RoundSummary, Transcript, TranscriptEntry, TranscriptEvent, format_duration,
    format_iteration_summary,
};

pub use toolgate_types::{
    AllowTier, ContextMessage, ConversationId, ConversationRecord, PermissionDecision, Role,
    ToolCall, ToolName, ToolNameError,
};
