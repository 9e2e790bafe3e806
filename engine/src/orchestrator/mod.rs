//! Tool orchestrator: the per-conversation state machine.
//!
//! Owns the ledger, the iteration controller, the cancellation supervisor and
//! the transcript. Every mutation goes through one of the operations below;
//! each returns a [`Directive`] telling the caller what to do next.
//!
//! ```text
//! start_turn ──> gate calls ──all allowed──> Execute ──complete_round──┐
//!                   │  ^                                              │
//!            denied │  │ approved                         Continue ───┤
//!                   v  │                                              │
//!            AwaitPermission ──denied──> Finished(Denied)   Conclude ─┴─> Finished
//!
//! cancel / cancel_round from any live phase ──> Finished(Cancelled)
//! ```
//!
//! All exits run through `finish_turn`, which drains ephemeral grants, resets
//! the iteration controller and returns the supervisor to `Idle`.

use std::time::Instant;

use futures_util::future::AbortHandle;

use toolgate_types::{
    ContextMessage, ConversationId, ConversationRecord, PermissionDecision, ToolCall, ToolName,
};

use crate::error::OrchestratorError;
use crate::executor::{ExecutorError, RoundOutput};
use crate::gate::{
    GateVerdict, PermissionGate, PermissionRequest, extract_purpose, extract_step_purpose,
};
use crate::iteration::{IterationController, IterationSummary, IterationVerdict, RoundCompletion};
use crate::ledger::AllowListLedger;
use crate::settings::OrchestratorSettings;
use crate::supervisor::{CancelOutcome, CancellationSupervisor, RoundEnd, RoundPhase, RoundToken};
use crate::transcript::{RoundSummary, Transcript, TranscriptEntry, TranscriptEvent};

/// Tool calls from a model response that start a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnInput {
    pub tool_calls: Vec<ToolCall>,
    pub context: Vec<ContextMessage>,
}

/// A round that passed the gate and should be handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub token: RoundToken,
    /// 1-based step number within the turn.
    pub step: u32,
    pub max: u32,
    pub calls: Vec<ToolCall>,
    pub context: Vec<ContextMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed(IterationSummary),
    CeilingReached(IterationSummary),
    Denied { tool: ToolName },
    Cancelled,
    Errored { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Execute(ExecutionRequest),
    AwaitPermission(RoundToken, PermissionRequest),
    Finished(TurnOutcome),
    /// Stale or late message; nothing changed.
    Ignored,
}

/// Durable allow-list change for the session store to flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceUpdate {
    pub conversation_id: ConversationId,
    pub allowed_tools: Vec<ToolName>,
}

/// The batch of one round and how far gating got.
#[derive(Debug)]
struct Round {
    token: RoundToken,
    calls: Vec<ToolCall>,
    context: Vec<ContextMessage>,
    /// Index of the next call to gate. Calls before it were allowed.
    gated: usize,
    started_at: Option<Instant>,
}

#[derive(Debug)]
pub struct ToolOrchestrator {
    conversation_id: ConversationId,
    settings: OrchestratorSettings,
    ledger: AllowListLedger,
    iteration: IterationController,
    supervisor: CancellationSupervisor,
    transcript: Transcript,
    round: Option<Round>,
}

impl ToolOrchestrator {
    #[must_use]
    pub fn new(record: ConversationRecord, settings: OrchestratorSettings) -> Self {
        Self {
            conversation_id: record.id,
            settings,
            ledger: AllowListLedger::new(record.allowed_tools),
            iteration: IterationController::new(),
            supervisor: CancellationSupervisor::new(),
            transcript: Transcript::new(),
            round: None,
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.supervisor.phase()
    }

    #[must_use]
    pub fn is_turn_active(&self) -> bool {
        self.iteration.is_active()
    }

    #[must_use]
    pub fn ledger(&self) -> &AllowListLedger {
        &self.ledger
    }

    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    /// Events emitted since the last call, oldest first.
    pub fn drain_events(&mut self) -> Vec<TranscriptEvent> {
        self.transcript.drain_events()
    }

    /// Current state of the conversation's durable slice.
    #[must_use]
    pub fn record(&self) -> ConversationRecord {
        ConversationRecord {
            id: self.conversation_id.clone(),
            allowed_tools: self.ledger.persistent().to_vec(),
        }
    }

    /// The persistent allow-list, if it changed since the last call.
    pub fn take_persistence_update(&mut self) -> Option<PersistenceUpdate> {
        self.ledger
            .take_dirty()
            .map(|allowed_tools| PersistenceUpdate {
                conversation_id: self.conversation_id.clone(),
                allowed_tools,
            })
    }

    pub fn start_turn(&mut self, input: TurnInput) -> Result<Directive, OrchestratorError> {
        if self.iteration.is_active() {
            return Err(OrchestratorError::TurnInFlight {
                phase: self.supervisor.phase(),
            });
        }
        if input.tool_calls.is_empty() {
            return Err(OrchestratorError::EmptyToolBatch);
        }

        let max = self.settings.max_iterations();
        tracing::debug!(
            conversation = %self.conversation_id,
            calls = input.tool_calls.len(),
            max,
            "Starting tool turn"
        );
        self.iteration.begin(max);
        Ok(self.begin_round(input.tool_calls, input.context))
    }

    /// Apply the operator's answer to the pending permission request.
    pub fn resolve_permission(
        &mut self,
        token: RoundToken,
        decision: PermissionDecision,
    ) -> Result<Directive, OrchestratorError> {
        if self.supervisor.active_token() != Some(token) {
            tracing::debug!(%token, "Ignoring permission decision for stale round");
            return Ok(Directive::Ignored);
        }
        if !self
            .supervisor
            .is_current(token, RoundPhase::WaitingOnPermission)
        {
            return Err(OrchestratorError::NotAwaitingPermission);
        }
        let Some(tool) = self
            .round
            .as_ref()
            .and_then(|round| round.calls.get(round.gated))
            .map(|call| call.name().clone())
        else {
            return Err(OrchestratorError::NotAwaitingPermission);
        };

        let Some(tier) = decision.grant_tier() else {
            tracing::info!(%tool, "Permission denied; ending turn");
            self.transcript.permission_denied(tool.clone());
            self.finish_turn();
            return Ok(Directive::Finished(TurnOutcome::Denied { tool }));
        };

        tracing::info!(%tool, %tier, "Permission granted");
        self.ledger.grant(tool.clone(), tier);
        self.transcript.permission_granted(tool, tier);
        self.supervisor.resume_gating(token);
        Ok(self.gate_round())
    }

    pub fn attach_abort(&mut self, token: RoundToken, handle: AbortHandle) {
        self.supervisor.attach_abort(token, handle);
    }

    /// Accept the executor's result for a round.
    pub fn complete_round(
        &mut self,
        token: RoundToken,
        result: Result<RoundOutput, ExecutorError>,
    ) -> Directive {
        let end = if result.is_ok() {
            RoundEnd::Completed
        } else {
            RoundEnd::Errored
        };
        if !self.supervisor.on_round_end(token, end) {
            return Directive::Ignored;
        }
        let Some(round) = self.round.take() else {
            tracing::warn!(%token, "Round ended without round state");
            self.finish_turn();
            return Directive::Finished(TurnOutcome::Errored {
                message: "round state missing".to_string(),
            });
        };

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(%token, error = %message, "Tool round failed");
                self.transcript.errored(message.clone());
                self.finish_turn();
                return Directive::Finished(TurnOutcome::Errored { message });
            }
        };

        let first = round.calls.first();
        let completion = RoundCompletion {
            purpose: first.map_or_else(
                || extract_step_purpose(&round.context),
                |call| extract_purpose(&round.context, call),
            ),
            tool: first.map(|call| call.name().clone()),
            duration: round
                .started_at
                .as_ref()
                .map(Instant::elapsed)
                .unwrap_or_default(),
            has_more_steps: output.has_more_steps,
            next_tool_calls: output.next_tool_calls,
            next_context: output.next_context,
        };

        let verdict = match self.iteration.record_round_complete(completion) {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(%token, %err, "Round completed outside a turn");
                self.finish_turn();
                return Directive::Finished(TurnOutcome::Errored {
                    message: err.to_string(),
                });
            }
        };

        let max = self.iteration.max().unwrap_or(1);
        if let Some(step) = self.iteration.last_step() {
            self.transcript.round_completed(RoundSummary {
                step: step.clone(),
                max,
                note: output.iteration_summary,
            });
        }
        self.supervisor.finish_round();

        match verdict {
            IterationVerdict::Continue(next) => {
                tracing::debug!(
                    step = self.iteration.current(),
                    next_calls = next.tool_calls.len(),
                    "Continuing to next round"
                );
                self.begin_round(next.tool_calls, next.context)
            }
            IterationVerdict::Conclude(mut summary) => {
                if summary.max_reached && !self.settings.multi_step() {
                    tracing::debug!("Multi-step disabled; dropping follow-up calls");
                    summary.max_reached = false;
                }
                let outcome = if summary.max_reached {
                    self.transcript.ceiling_reached(max);
                    TurnOutcome::CeilingReached(summary.clone())
                } else {
                    TurnOutcome::Completed(summary.clone())
                };
                tracing::info!(
                    steps = summary.total_steps(),
                    max_reached = summary.max_reached,
                    "Tool turn concluded"
                );
                self.transcript.turn_concluded(summary);
                self.finish_turn();
                Directive::Finished(outcome)
            }
        }
    }

    /// Cancel whatever round is live. No-op when idle.
    pub fn cancel(&mut self) -> Directive {
        match self.supervisor.active_token() {
            Some(token) => self.cancel_round(token),
            None => Directive::Ignored,
        }
    }

    /// Cancel a specific round. Idempotent.
    pub fn cancel_round(&mut self, token: RoundToken) -> Directive {
        match self.supervisor.cancel(token) {
            CancelOutcome::NoOp => Directive::Ignored,
            CancelOutcome::Cancelled => {
                self.transcript.cancelled();
                self.finish_turn();
                Directive::Finished(TurnOutcome::Cancelled)
            }
        }
    }

    fn begin_round(&mut self, calls: Vec<ToolCall>, context: Vec<ContextMessage>) -> Directive {
        let token = self.supervisor.begin_round();
        self.transcript.open_round();
        self.round = Some(Round {
            token,
            calls,
            context,
            gated: 0,
            started_at: None,
        });
        self.gate_round()
    }

    /// Gate the remaining calls of the round in emission order.
    ///
    /// Stops at the first call that needs approval; everything after it
    /// waits unevaluated.
    fn gate_round(&mut self) -> Directive {
        let Some(round) = self.round.as_mut() else {
            return Directive::Ignored;
        };
        let gate = PermissionGate::new(&self.settings.policy);

        while let Some(call) = round.calls.get(round.gated) {
            match gate.evaluate(call, &self.ledger, &round.context) {
                GateVerdict::Allowed => round.gated += 1,
                GateVerdict::Denied(request) => {
                    tracing::debug!(
                        token = %round.token,
                        tool = %request.call.name(),
                        "Suspending round for permission"
                    );
                    self.supervisor.await_permission(round.token);
                    self.transcript.permission_requested(&request);
                    return Directive::AwaitPermission(round.token, *request);
                }
            }
        }

        let step = self.iteration.next_step().unwrap_or(1);
        let max = self.iteration.max().unwrap_or(1);
        self.supervisor.start_executing(round.token);
        round.started_at = Some(Instant::now());
        self.transcript.round_started(step, max);
        tracing::debug!(token = %round.token, step, max, "Executing round");

        Directive::Execute(ExecutionRequest {
            token: round.token,
            step,
            max,
            calls: round.calls.clone(),
            context: round.context.clone(),
        })
    }

    fn finish_turn(&mut self) {
        let cleared = self.ledger.clear_all_ephemeral();
        self.iteration.reset();
        self.supervisor.finish_round();
        self.round = None;
        tracing::debug!(cleared_ephemeral = cleared, "Turn finished");
    }
}
