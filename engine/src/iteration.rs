//! Iteration controller: bounds tool rounds per user turn.

use std::time::Duration;

use toolgate_types::{ContextMessage, ToolCall, ToolName};

/// A completed round as recorded in the turn's step history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationStep {
    pub number: u32,
    pub purpose: String,
    /// First tool of the round.
    pub tool: Option<ToolName>,
    pub duration: Duration,
}

impl IterationStep {
    #[must_use]
    pub fn short_name(&self) -> Option<&str> {
        self.tool.as_ref().map(ToolName::short_name)
    }
}

/// Caller-supplied facts about a finished round.
#[derive(Debug, Clone, Default)]
pub struct RoundCompletion {
    pub purpose: String,
    pub tool: Option<ToolName>,
    pub duration: Duration,
    pub has_more_steps: bool,
    pub next_tool_calls: Vec<ToolCall>,
    pub next_context: Vec<ContextMessage>,
}

/// Inputs of the next round.
#[derive(Debug, Clone, PartialEq)]
pub struct NextRound {
    pub tool_calls: Vec<ToolCall>,
    pub context: Vec<ContextMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IterationSummary {
    pub steps: Vec<IterationStep>,
    /// The ceiling, not the model, ended the turn.
    pub max_reached: bool,
}

impl IterationSummary {
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationVerdict {
    Continue(NextRound),
    Conclude(IterationSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no iteration sequence is active")]
pub struct NotStarted;

/// Per-turn counter state.
///
/// Invariant: `current <= max`.
#[derive(Debug, Clone)]
struct IterationState {
    current: u32,
    max: u32,
    steps: Vec<IterationStep>,
}

#[derive(Debug, Default)]
pub struct IterationController {
    state: Option<IterationState>,
}

impl IterationController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sequence. `max` is clamped to at least one round.
    pub fn begin(&mut self, max: u32) {
        if self.state.is_some() {
            tracing::warn!("Iteration sequence restarted without reset");
        }
        self.state = Some(IterationState {
            current: 0,
            max: max.max(1),
            steps: Vec::new(),
        });
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    /// Completed rounds in this sequence (0 when inactive).
    #[must_use]
    pub fn current(&self) -> u32 {
        self.state.as_ref().map_or(0, |s| s.current)
    }

    #[must_use]
    pub fn max(&self) -> Option<u32> {
        self.state.as_ref().map(|s| s.max)
    }

    /// 1-based number of the round about to run.
    #[must_use]
    pub fn next_step(&self) -> Option<u32> {
        self.state
            .as_ref()
            .map(|s| s.current.saturating_add(1).min(s.max))
    }

    /// Most recently recorded step.
    #[must_use]
    pub fn last_step(&self) -> Option<&IterationStep> {
        self.state.as_ref().and_then(|s| s.steps.last())
    }

    /// Record a successful round and decide whether another one runs.
    pub fn record_round_complete(
        &mut self,
        completion: RoundCompletion,
    ) -> Result<IterationVerdict, NotStarted> {
        let state = self.state.as_mut().ok_or(NotStarted)?;

        if state.current < state.max {
            state.current += 1;
            state.steps.push(IterationStep {
                number: state.current,
                purpose: completion.purpose,
                tool: completion.tool,
                duration: completion.duration,
            });
        } else {
            tracing::warn!(
                max = state.max,
                "Round reported after ceiling; not counted"
            );
        }

        let wants_more = completion.has_more_steps && !completion.next_tool_calls.is_empty();
        if completion.has_more_steps && completion.next_tool_calls.is_empty() {
            tracing::debug!("Round reported more steps without follow-up calls; concluding");
        }

        if state.current >= state.max {
            tracing::debug!(max = state.max, wants_more, "Iteration ceiling reached");
            return Ok(IterationVerdict::Conclude(IterationSummary {
                steps: state.steps.clone(),
                max_reached: wants_more,
            }));
        }

        if wants_more {
            return Ok(IterationVerdict::Continue(NextRound {
                tool_calls: completion.next_tool_calls,
                context: completion.next_context,
            }));
        }

        Ok(IterationVerdict::Conclude(IterationSummary {
            steps: state.steps.clone(),
            max_reached: false,
        }))
    }

    /// Drop all state. Called on every turn exit path.
    pub fn reset(&mut self) {
        self.state = None;
    }
}
