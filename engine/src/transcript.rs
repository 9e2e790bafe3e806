//! Transcript integration: orchestrator transitions as transcript entries.
//!
//! Holds no policy. Each event is appended with a retention tag; transient
//! entries ("in progress" markers, open prompts) are removed on cancellation,
//! denial, or when the round they describe completes.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use toolgate_types::{AllowTier, ToolName};

use crate::gate::{ArgumentDetail, PermissionRequest};
use crate::iteration::{IterationStep, IterationSummary};

/// Per-round summary shown when a round completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub step: IterationStep,
    pub max: u32,
    /// Executor-provided summary line, if any.
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    RoundStarted {
        n: u32,
        max: u32,
    },
    PermissionRequested {
        tool_name: ToolName,
        purpose: String,
        details: Vec<ArgumentDetail>,
    },
    PermissionGranted {
        tool_name: ToolName,
        tier: AllowTier,
    },
    PermissionDenied {
        tool_name: ToolName,
    },
    RoundCompleted {
        summary: RoundSummary,
    },
    CeilingReached {
        max: u32,
    },
    TurnConcluded {
        summary: IterationSummary,
    },
    Cancelled,
    Errored {
        message: String,
    },
}

impl TranscriptEvent {
    #[must_use]
    pub fn retention(&self) -> Retention {
        match self {
            Self::RoundStarted { .. } | Self::PermissionRequested { .. } => Retention::Transient,
            Self::PermissionGranted { .. }
            | Self::PermissionDenied { .. }
            | Self::RoundCompleted { .. }
            | Self::CeilingReached { .. }
            | Self::TurnConcluded { .. }
            | Self::Cancelled
            | Self::Errored { .. } => Retention::Persistent,
        }
    }
}

impl fmt::Display for TranscriptEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundStarted { n, max } => write!(f, "Step {n} of {max}..."),
            Self::PermissionRequested {
                tool_name,
                purpose,
                details,
            } => {
                write!(f, "Permission required: {tool_name}\n  Purpose: {purpose}")?;
                for detail in details {
                    write!(f, "\n  {}: {}", detail.key, detail.value)?;
                }
                Ok(())
            }
            Self::PermissionGranted { tool_name, tier } => match tier {
                AllowTier::Persistent => write!(f, "Always allowing {tool_name}"),
                AllowTier::Ephemeral => write!(f, "Allowed {tool_name} for this turn"),
            },
            Self::PermissionDenied { tool_name } => {
                write!(f, "Permission denied for {tool_name}")
            }
            Self::RoundCompleted { summary } => {
                let step = &summary.step;
                write!(
                    f,
                    "Step {} of {}: {} ({})",
                    step.number,
                    summary.max,
                    step.purpose,
                    format_duration(step.duration)
                )?;
                if let Some(note) = &summary.note {
                    write!(f, "\n  {note}")?;
                }
                Ok(())
            }
            Self::CeilingReached { max } => {
                write!(f, "Reached the limit of {max} tool step(s) for this turn")
            }
            Self::TurnConcluded { summary } => f.write_str(&format_iteration_summary(summary)),
            Self::Cancelled => f.write_str("Request cancelled"),
            Self::Errored { message } => write!(f, "Tool execution error: {message}"),
        }
    }
}

/// Multi-step summary block.
#[must_use]
pub fn format_iteration_summary(summary: &IterationSummary) -> String {
    let mut out = if summary.max_reached {
        "Multi-step execution stopped (max iterations reached)".to_string()
    } else {
        format!("Execution complete - {} step(s)", summary.total_steps())
    };
    for step in &summary.steps {
        out.push_str(&format!(
            "\n  Step {}: {} ({})",
            step.number,
            step.purpose,
            format_duration(step.duration)
        ));
    }
    out
}

/// `<1s` as milliseconds, otherwise seconds with one decimal.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }
    format!("{:.1}s", duration.as_millis() as f64 / 1000.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Removable on cancellation or replacement.
    Transient,
    /// Retained forever.
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub seq: u64,
    pub event: TranscriptEvent,
}

impl TranscriptEntry {
    #[must_use]
    pub fn retention(&self) -> Retention {
        self.event.retention()
    }
}

/// Append-only log of entries plus an outbox of newly emitted events.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    next_seq: u64,
    /// First sequence number of the current round.
    round_start: u64,
    outbox: VecDeque<TranscriptEvent>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Remove every transient entry; returns how many were removed.
    pub fn remove_transient(&mut self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.retention() == Retention::Persistent);
        before - self.entries.len()
    }

    #[cfg(test)]
    fn has_transient(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.retention() == Retention::Transient)
    }

    /// Events emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<TranscriptEvent> {
        self.outbox.drain(..).collect()
    }

    fn push(&mut self, event: TranscriptEvent) {
        self.outbox.push_back(event.clone());
        self.entries.push(TranscriptEntry {
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    // Orchestrator transitions. Each one decides which transient markers it
    // replaces before appending its own entry.

    /// Entries pushed after this belong to a new round of tool calls.
    pub fn open_round(&mut self) {
        self.round_start = self.next_seq;
    }

    pub fn round_started(&mut self, n: u32, max: u32) {
        self.push(TranscriptEvent::RoundStarted { n, max });
    }

    pub fn permission_requested(&mut self, request: &PermissionRequest) {
        self.push(TranscriptEvent::PermissionRequested {
            tool_name: request.call.name().clone(),
            purpose: request.purpose.clone(),
            details: request.details.clone(),
        });
    }

    pub fn permission_granted(&mut self, tool_name: ToolName, tier: AllowTier) {
        self.remove_transient();
        self.push(TranscriptEvent::PermissionGranted { tool_name, tier });
    }

    /// Restores the pre-tool-call state, then records the denial once.
    ///
    /// Per-turn grants made earlier in the same round go too: the round never
    /// ran and the grants are cleared with the turn. "Always allow" lines stay.
    pub fn permission_denied(&mut self, tool_name: ToolName) {
        self.remove_transient();
        let round_start = self.round_start;
        self.entries.retain(|entry| {
            entry.seq < round_start
                || !matches!(
                    entry.event,
                    TranscriptEvent::PermissionGranted {
                        tier: AllowTier::Ephemeral,
                        ..
                    }
                )
        });
        self.push(TranscriptEvent::PermissionDenied { tool_name });
    }

    pub fn round_completed(&mut self, summary: RoundSummary) {
        self.remove_transient();
        self.push(TranscriptEvent::RoundCompleted { summary });
    }

    pub fn ceiling_reached(&mut self, max: u32) {
        self.push(TranscriptEvent::CeilingReached { max });
    }

    pub fn turn_concluded(&mut self, summary: IterationSummary) {
        self.remove_transient();
        self.push(TranscriptEvent::TurnConcluded { summary });
    }

    pub fn cancelled(&mut self) {
        self.remove_transient();
        self.push(TranscriptEvent::Cancelled);
    }

    pub fn errored(&mut self, message: String) {
        self.remove_transient();
        self.push(TranscriptEvent::Errored { message });
    }
}
