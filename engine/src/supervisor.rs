//! Cancellation supervisor: one token per round.
//!
//! # State Machine
//! ```text
//!            begin_round()
//! Idle ─────────────────────> Gating ──await_permission()──> WaitingOnPermission
//!  ^                            │   <──────resume_gating()────────┘
//!  │                            │ start_executing()
//!  │                            v
//!  │                         Executing ──on_round_end()──> Completed | Errored
//!  │                                                            │
//!  └────────────────── finish_round() <─────────────────────────┘
//!                                   cancel() from any live phase ──> Cancelled
//! ```
//!
//! A token is checked at the single point where a result is accepted back.
//! Whichever of cancellation or completion is observed first wins; the other
//! is reported as stale and must be ignored by the caller.

use std::fmt;

use futures_util::future::AbortHandle;

use toolgate_types::RoundId;

/// Handle identifying one round. Cheap to copy into executor tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundToken(RoundId);

impl RoundToken {
    #[must_use]
    pub fn id(self) -> RoundId {
        self.0
    }
}

impl fmt::Display for RoundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    /// Token issued; calls are being evaluated synchronously.
    Gating,
    WaitingOnPermission,
    Executing,
    Completed,
    Cancelled,
    Errored,
}

impl RoundPhase {
    /// Phases a cancellation may interrupt.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(
            self,
            Self::Gating | Self::WaitingOnPermission | Self::Executing
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }
}

/// How the executor finished a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEnd {
    Completed,
    Errored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The round was live and is now cancelled; the caller must clean up.
    Cancelled,
    /// Unknown or already terminal token. Nothing changed.
    NoOp,
}

#[derive(Debug)]
struct ActiveRound {
    token: RoundToken,
    phase: RoundPhase,
    abort: Option<AbortHandle>,
}

#[derive(Debug)]
pub struct CancellationSupervisor {
    last_id: RoundId,
    round: Option<ActiveRound>,
}

impl Default for CancellationSupervisor {
    fn default() -> Self {
        Self {
            last_id: RoundId::new(0),
            round: None,
        }
    }
}

impl CancellationSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token. Any previous round is forgotten.
    pub fn begin_round(&mut self) -> RoundToken {
        if let Some(prev) = &self.round
            && prev.phase.is_live()
        {
            tracing::warn!(token = %prev.token, phase = ?prev.phase, "Replacing a live round");
        }
        self.last_id = self.last_id.next();
        let token = RoundToken(self.last_id);
        self.round = Some(ActiveRound {
            token,
            phase: RoundPhase::Gating,
            abort: None,
        });
        token
    }

    #[must_use]
    pub fn phase(&self) -> RoundPhase {
        self.round.as_ref().map_or(RoundPhase::Idle, |r| r.phase)
    }

    #[must_use]
    pub fn active_token(&self) -> Option<RoundToken> {
        self.round
            .as_ref()
            .filter(|r| r.phase.is_live())
            .map(|r| r.token)
    }

    /// `true` if `token` is the current round and in `phase`.
    #[must_use]
    pub fn is_current(&self, token: RoundToken, phase: RoundPhase) -> bool {
        self.round
            .as_ref()
            .is_some_and(|r| r.token == token && r.phase == phase)
    }

    pub fn await_permission(&mut self, token: RoundToken) -> bool {
        self.transition(token, RoundPhase::Gating, RoundPhase::WaitingOnPermission)
    }

    pub fn resume_gating(&mut self, token: RoundToken) -> bool {
        self.transition(token, RoundPhase::WaitingOnPermission, RoundPhase::Gating)
    }

    pub fn start_executing(&mut self, token: RoundToken) -> bool {
        self.transition(token, RoundPhase::Gating, RoundPhase::Executing)
    }

    /// Register the abort handle of the executor future for `token`.
    ///
    /// If the round is already gone the handle is aborted immediately so a
    /// late spawn cannot outlive its cancellation.
    pub fn attach_abort(&mut self, token: RoundToken, handle: AbortHandle) {
        match self.round.as_mut() {
            Some(round) if round.token == token && round.phase == RoundPhase::Executing => {
                round.abort = Some(handle);
            }
            _ => {
                tracing::debug!(%token, "Abort handle for stale round; aborting");
                handle.abort();
            }
        }
    }

    /// Cancel a live round. Idempotent: terminal or unknown tokens are a no-op.
    pub fn cancel(&mut self, token: RoundToken) -> CancelOutcome {
        let Some(round) = self.round.as_mut() else {
            return CancelOutcome::NoOp;
        };
        if round.token != token || !round.phase.is_live() {
            return CancelOutcome::NoOp;
        }

        if let Some(handle) = round.abort.take() {
            handle.abort();
        }
        tracing::info!(%token, from = ?round.phase, "Round cancelled");
        round.phase = RoundPhase::Cancelled;
        CancelOutcome::Cancelled
    }

    /// Accept the executor's end of a round.
    ///
    /// Returns `false` (discard the result) unless `token` is executing.
    pub fn on_round_end(&mut self, token: RoundToken, end: RoundEnd) -> bool {
        let Some(round) = self.round.as_mut() else {
            return false;
        };
        if round.token != token || round.phase != RoundPhase::Executing {
            tracing::debug!(%token, phase = ?round.phase, "Discarding stale round result");
            return false;
        }
        round.abort = None;
        round.phase = match end {
            RoundEnd::Completed => RoundPhase::Completed,
            RoundEnd::Errored => RoundPhase::Errored,
        };
        true
    }

    /// Return to `Idle` once the round's outcome has been resolved.
    ///
    /// A live round is aborted first; this is the exit path for denials.
    pub fn finish_round(&mut self) {
        if let Some(mut round) = self.round.take()
            && let Some(handle) = round.abort.take()
        {
            handle.abort();
        }
    }

    fn transition(&mut self, token: RoundToken, from: RoundPhase, to: RoundPhase) -> bool {
        match self.round.as_mut() {
            Some(round) if round.token == token && round.phase == from => {
                round.phase = to;
                true
            }
            _ => false,
        }
    }
}
