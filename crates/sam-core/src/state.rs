//! Client run-state machine
//!
//! Tracks whether a client is idle, waiting in the worker pool's queue, or
//! being serviced by a worker. All transitions go through one lock-guarded
//! function so the reactor (which schedules) and the workers (which claim
//! and finish) always agree on who owns the next unit of work.
//!
//! ```text
//!            Schedule              Claim
//!   Idle ─────────────▶ Queued ───────────▶ Running
//!    ▲                    ▲                    │
//!    │                    │ Schedule           │
//!    │                    └────────────────────┤
//!    │          Finish (nothing new)           │
//!    └─────────────────────────────────────────┘
//!        Finish on Queued ⇒ Running again (re-queued mid-service)
//! ```

use core::fmt;
use std::sync::Mutex;

use crate::lock;

/// Run-state of a client with respect to the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunState {
    /// No pending work, not in the pool's queue
    Idle = 0,

    /// Pending work observed; either in the pool's queue, or running and
    /// flagged to go around once more
    Queued = 1,

    /// A worker owns the client
    Running = 2,
}

impl RunState {
    #[inline]
    pub const fn is_idle(&self) -> bool {
        matches!(self, RunState::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Queued => write!(f, "queued"),
            RunState::Running => write!(f, "running"),
        }
    }
}

/// Inputs to the run-state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// Reactor observed pending work.
    Schedule,
    /// A worker popped the client off the queue.
    Claim,
    /// A worker finished one `do_work()` pass.
    Finish,
}

/// Lock-guarded run-state.
#[derive(Debug)]
pub struct RunStateCell {
    state: Mutex<RunState>,
}

impl RunStateCell {
    pub const fn new() -> Self {
        Self { state: Mutex::new(RunState::Idle) }
    }

    /// Current state (a snapshot; may change right after).
    pub fn current(&self) -> RunState {
        *lock(&self.state)
    }

    /// Apply `event` and return `(old, new)`.
    ///
    /// - `Schedule`: anything → Queued. The caller enqueues the client only
    ///   when `old == Idle`; otherwise it is already queued or the running
    ///   worker will pick the new work up on `Finish`.
    /// - `Claim`: Queued → Running; any other state is left unchanged.
    /// - `Finish`: Running → Idle; Queued → Running (work arrived while the
    ///   worker was busy, keep servicing); Idle is left unchanged.
    pub fn transition(&self, event: RunEvent) -> (RunState, RunState) {
        let mut state = lock(&self.state);
        let old = *state;
        let new = match (event, old) {
            (RunEvent::Schedule, _) => RunState::Queued,
            (RunEvent::Claim, RunState::Queued) => RunState::Running,
            (RunEvent::Claim, s) => s,
            (RunEvent::Finish, RunState::Running) => RunState::Idle,
            (RunEvent::Finish, RunState::Queued) => RunState::Running,
            (RunEvent::Finish, RunState::Idle) => RunState::Idle,
        };
        *state = new;
        (old, new)
    }
}

impl Default for RunStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunEvent::*;
    use RunState::*;

    #[test]
    fn test_schedule_from_idle_enqueues() {
        let cell = RunStateCell::new();
        assert_eq!(cell.transition(Schedule), (Idle, Queued));
        // Second schedule while queued: no double enqueue
        assert_eq!(cell.transition(Schedule), (Queued, Queued));
    }

    #[test]
    fn test_claim_and_finish() {
        let cell = RunStateCell::new();
        cell.transition(Schedule);
        assert_eq!(cell.transition(Claim), (Queued, Running));
        assert_eq!(cell.transition(Finish), (Running, Idle));
        assert!(cell.current().is_idle());
    }

    #[test]
    fn test_requeue_mid_service() {
        let cell = RunStateCell::new();
        cell.transition(Schedule);
        cell.transition(Claim);

        // Reactor sees new input while the worker runs
        assert_eq!(cell.transition(Schedule), (Running, Queued));

        // Worker finishes the pass and must go around again
        assert_eq!(cell.transition(Finish), (Queued, Running));
        assert_eq!(cell.transition(Finish), (Running, Idle));
    }

    #[test]
    fn test_claim_on_idle_is_noop() {
        let cell = RunStateCell::new();
        assert_eq!(cell.transition(Claim), (Idle, Idle));
        assert_eq!(cell.transition(Finish), (Idle, Idle));
    }

    #[test]
    fn test_display() {
        assert_eq!(Running.to_string(), "running");
    }
}
