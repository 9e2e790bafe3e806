//! Async turn driver.
//!
//! The orchestrator is synchronous; this module owns the suspension points.
//! Executor rounds and operator prompts run as abortable tokio tasks and
//! report back through one channel, so every result re-enters the state
//! machine as a discrete message.

use std::sync::Arc;

use futures_util::future::{AbortHandle, Abortable, Aborted};
use tokio::sync::mpsc;

use toolgate_types::PermissionDecision;

use crate::error::OrchestratorError;
use crate::executor::{ExecutorError, OperatorPrompt, RoundOutput, ToolExecutor, TranscriptSink};
use crate::gate::PermissionRequest;
use crate::orchestrator::{Directive, ExecutionRequest, ToolOrchestrator, TurnInput, TurnOutcome};
use crate::supervisor::RoundToken;

const DRIVER_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
enum DriverMsg {
    RoundDone {
        token: RoundToken,
        result: Result<RoundOutput, ExecutorError>,
    },
    Decision {
        token: RoundToken,
        decision: PermissionDecision,
    },
}

pub struct TurnDriver {
    executor: Arc<dyn ToolExecutor>,
    operator: Arc<dyn OperatorPrompt>,
}

impl TurnDriver {
    #[must_use]
    pub fn new(executor: Arc<dyn ToolExecutor>, operator: Arc<dyn OperatorPrompt>) -> Self {
        Self { executor, operator }
    }

    /// Run one turn to its outcome.
    ///
    /// A message on `cancel_rx` cancels the live round. A closed cancel
    /// channel only stops listening.
    pub async fn drive(
        &self,
        orchestrator: &mut ToolOrchestrator,
        input: TurnInput,
        cancel_rx: &mut mpsc::Receiver<()>,
        sink: &mut dyn TranscriptSink,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let (tx, mut rx) = mpsc::channel(DRIVER_CHANNEL_CAPACITY);
        let mut prompts: Vec<AbortHandle> = Vec::new();
        let mut cancel_open = true;

        let mut directive = orchestrator.start_turn(input)?;
        loop {
            forward_events(orchestrator, sink);
            match directive {
                Directive::Execute(request) => self.spawn_round(orchestrator, request, tx.clone()),
                Directive::AwaitPermission(token, request) => {
                    prompts.push(self.spawn_prompt(token, request, tx.clone()));
                }
                Directive::Finished(outcome) => {
                    for prompt in prompts {
                        prompt.abort();
                    }
                    return Ok(outcome);
                }
                Directive::Ignored => {}
            }

            directive = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(DriverMsg::RoundDone { token, result }) => {
                        let chunks = result
                            .as_ref()
                            .map(|output| output.chunks.clone())
                            .unwrap_or_default();
                        let next = orchestrator.complete_round(token, result);
                        if next != Directive::Ignored {
                            for chunk in &chunks {
                                sink.output(chunk);
                            }
                        }
                        next
                    }
                    Some(DriverMsg::Decision { token, decision }) => {
                        match orchestrator.resolve_permission(token, decision) {
                            Ok(next) => next,
                            Err(err) => {
                                tracing::warn!(%token, %err, "Permission decision rejected; cancelling turn");
                                abandon_turn(orchestrator, sink, prompts);
                                return Err(err);
                            }
                        }
                    }
                    // `tx` is alive for the whole loop.
                    None => orchestrator.cancel(),
                },
                signal = cancel_rx.recv(), if cancel_open => match signal {
                    Some(()) => orchestrator.cancel(),
                    None => {
                        cancel_open = false;
                        Directive::Ignored
                    }
                },
            };
        }
    }

    fn spawn_round(
        &self,
        orchestrator: &mut ToolOrchestrator,
        request: ExecutionRequest,
        tx: mpsc::Sender<DriverMsg>,
    ) {
        let token = request.token;
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        orchestrator.attach_abort(token, abort_handle);

        let future = self.executor.execute(request.calls, request.context);
        let join_handle = tokio::spawn(Abortable::new(future, abort_registration));

        tokio::spawn(async move {
            let result = match join_handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(Aborted)) => {
                    tracing::debug!(%token, "Executor round aborted");
                    return;
                }
                Err(err) => Err(ExecutorError::Join(err.to_string())),
            };
            // Receiver gone means the turn is over; the result is stale.
            let _ = tx.send(DriverMsg::RoundDone { token, result }).await;
        });
    }

    fn spawn_prompt(
        &self,
        token: RoundToken,
        request: PermissionRequest,
        tx: mpsc::Sender<DriverMsg>,
    ) -> AbortHandle {
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let future = Abortable::new(self.operator.decide(request), abort_registration);

        tokio::spawn(async move {
            if let Ok(decision) = future.await {
                let _ = tx.send(DriverMsg::Decision { token, decision }).await;
            }
        });
        abort_handle
    }
}

/// Cancel the live round and every open prompt so the next turn can start.
fn abandon_turn(
    orchestrator: &mut ToolOrchestrator,
    sink: &mut dyn TranscriptSink,
    prompts: Vec<AbortHandle>,
) {
    orchestrator.cancel();
    forward_events(orchestrator, sink);
    for prompt in prompts {
        prompt.abort();
    }
}

fn forward_events(orchestrator: &mut ToolOrchestrator, sink: &mut dyn TranscriptSink) {
    for event in orchestrator.drain_events() {
        sink.emit(&event);
    }
}
