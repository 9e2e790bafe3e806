//! Scripted executor: replays recorded rounds from a scenario file.
//!
//! Stands in for the plugin transport and the inference client in the
//! headless binary and in tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;

use toolgate_types::{ContextMessage, ConversationRecord, ToolCall};

use crate::executor::{ExecFut, ExecutorError, RoundOutput, ToolExecutor};
use crate::orchestrator::TurnInput;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One recorded round.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedRound {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub chunks: Vec<String>,
    #[serde(default)]
    pub has_more_steps: bool,
    #[serde(default)]
    pub next_tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub next_context: Vec<ContextMessage>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Fail the round with this message instead of returning output.
    #[serde(default)]
    pub error: Option<String>,
}

/// A full turn: the model's first tool calls and the rounds that follow.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub conversation: ConversationRecord,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub rounds: Vec<ScriptedRound>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn turn_input(&self) -> TurnInput {
        TurnInput {
            tool_calls: self.tool_calls.clone(),
            context: self.context.clone(),
        }
    }

    #[must_use]
    pub fn executor(&self) -> ScriptedExecutor {
        ScriptedExecutor::new(self.rounds.clone())
    }
}

/// Hands out the recorded rounds in order, one per `execute` call.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rounds: Mutex<VecDeque<ScriptedRound>>,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new(rounds: impl IntoIterator<Item = ScriptedRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ToolExecutor for ScriptedExecutor {
    fn execute(&self, calls: Vec<ToolCall>, _context: Vec<ContextMessage>) -> ExecFut {
        let next = self
            .rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        Box::pin(async move {
            let Some(round) = next else {
                let tool = calls
                    .first()
                    .map(|call| call.name().to_string())
                    .unwrap_or_default();
                return Err(ExecutorError::ToolFailed {
                    tool,
                    message: "no scripted round left".to_string(),
                });
            };

            if round.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(round.delay_ms)).await;
            }
            if let Some(message) = round.error {
                return Err(ExecutorError::Transport(message));
            }
            Ok(RoundOutput {
                chunks: round.chunks,
                has_more_steps: round.has_more_steps,
                next_tool_calls: round.next_tool_calls,
                next_context: round.next_context,
                iteration_summary: round.summary,
            })
        })
    }
}
