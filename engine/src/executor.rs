//! Seams to the outside world: tool executor, operator, transcript sink.

use std::future::Future;
use std::pin::Pin;

use toolgate_types::{ContextMessage, PermissionDecision, ToolCall};

use crate::gate::PermissionRequest;
use crate::transcript::TranscriptEvent;

/// Executor round future type alias.
pub type ExecFut = Pin<Box<dyn Future<Output = Result<RoundOutput, ExecutorError>> + Send>>;

/// Operator decision future type alias.
pub type PromptFut = Pin<Box<dyn Future<Output = PermissionDecision> + Send>>;

/// What the executor reports back for one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundOutput {
    /// Streamed result fragments, already formatted by the executor.
    pub chunks: Vec<String>,
    /// The model asked for another round.
    pub has_more_steps: bool,
    pub next_tool_calls: Vec<ToolCall>,
    pub next_context: Vec<ContextMessage>,
    /// Optional one-line summary of the round.
    pub iteration_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("tool {tool} failed: {message}")]
    ToolFailed { tool: String, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("executor task ended unexpectedly: {0}")]
    Join(String),
}

/// Runs one round of tool calls plus the model's follow-up.
///
/// The returned future is spawned and may be aborted at any await point.
pub trait ToolExecutor: Send + Sync {
    fn execute(&self, calls: Vec<ToolCall>, context: Vec<ContextMessage>) -> ExecFut;
}

/// The human who answers permission prompts.
pub trait OperatorPrompt: Send + Sync {
    fn decide(&self, request: PermissionRequest) -> PromptFut;
}

/// Consumer of transcript events, in emission order.
pub trait TranscriptSink: Send {
    fn emit(&mut self, event: &TranscriptEvent);

    /// Executor output of an accepted round. Stale rounds never reach here.
    fn output(&mut self, _chunk: &str) {}
}

impl TranscriptSink for Vec<TranscriptEvent> {
    fn emit(&mut self, event: &TranscriptEvent) {
        self.push(event.clone());
    }
}
