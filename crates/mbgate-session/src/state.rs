use std::fmt;

/// Per-request session states.
///
/// ```text
/// IDLE -> OPENING -> READY -> COMMAND_IN_FLIGHT -> SUCCESS | FAILED -> CLOSED
/// ```
///
/// Requests rejected before a session is opened go `IDLE -> FAILED -> CLOSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Opening,
    Ready,
    CommandInFlight,
    Success,
    Failed,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Opening => "OPENING",
            SessionState::Ready => "READY",
            SessionState::CommandInFlight => "COMMAND_IN_FLIGHT",
            SessionState::Success => "SUCCESS",
            SessionState::Failed => "FAILED",
            SessionState::Closed => "CLOSED",
        }
    }

    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Opening)
                | (Idle, Failed)
                | (Opening, Ready)
                | (Opening, Failed)
                | (Ready, CommandInFlight)
                | (Ready, Failed)
                | (CommandInFlight, CommandInFlight)
                | (CommandInFlight, Success)
                | (CommandInFlight, Failed)
                | (Success, Closed)
                | (Failed, Closed)
        )
    }

    /// States in which cancellation may interrupt the session.
    pub fn is_interruptible(self) -> bool {
        matches!(self, SessionState::Opening | SessionState::CommandInFlight)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the states one request went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrail {
    states: Vec<SessionState>,
}

impl StateTrail {
    pub fn new() -> Self {
        Self {
            states: vec![SessionState::Idle],
        }
    }

    pub fn current(&self) -> SessionState {
        self.states
            .last()
            .copied()
            .unwrap_or(SessionState::Idle)
    }

    pub fn advance(&mut self, next: SessionState) {
        let current = self.current();
        debug_assert!(
            current.can_advance_to(next),
            "illegal session transition {current} -> {next}"
        );
        if !current.can_advance_to(next) {
            tracing::warn!(from = %current, to = %next, "unexpected session transition");
        }
        tracing::trace!(from = %current, to = %next, "session state");
        self.states.push(next);
    }

    pub fn states(&self) -> &[SessionState] {
        &self.states
    }

    pub fn visited(&self, state: SessionState) -> bool {
        self.states.contains(&state)
    }
}

impl Default for StateTrail {
    fn default() -> Self {
        Self::new()
    }
}
