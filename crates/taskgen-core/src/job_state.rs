//! Explicit per-job state machine, with a legal-transition table and an
//! append-only transition log, in the style this repo's orchestration
//! state machines use elsewhere.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Queued,
    Prompting,
    Invoking,
    Parsing,
    Recovering,
    Retrying(u32),
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Prompting => write!(f, "prompting"),
            Self::Invoking => write!(f, "invoking"),
            Self::Parsing => write!(f, "parsing"),
            Self::Recovering => write!(f, "recovering"),
            Self::Retrying(n) => write!(f, "retrying({n})"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Transitions are linear (`queued -> prompting -> invoking -> parsing ->
/// done|failed`) except `parsing <-> recovering` and `retrying -> prompting`.
pub fn is_legal_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;
    match (from, to) {
        (Queued, Prompting) => true,
        (Prompting, Invoking) => true,
        (Invoking, Parsing) => true,
        (Invoking, Failed) => true,
        (Parsing, Recovering) => true,
        (Recovering, Parsing) => true,
        (Parsing, Done) => true,
        (Parsing, Failed) => true,
        (Recovering, Failed) => true,
        (Parsing, Retrying(_)) => true,
        (Recovering, Retrying(_)) => true,
        (Invoking, Retrying(_)) => true,
        (Retrying(_), Prompting) => true,
        (Retrying(_), Failed) => true,
        _ => false,
    }
}

#[derive(Debug, thiserror::Error)]
#[error("illegal transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub from: JobState,
    pub to: JobState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Tracks one job's current state and its full transition history.
pub struct JobStateMachine {
    current: JobState,
    log: Vec<TransitionRecord>,
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self {
            current: JobState::Queued,
            log: Vec::new(),
        }
    }

    pub fn current(&self) -> JobState {
        self.current
    }

    pub fn log(&self) -> &[TransitionRecord] {
        &self.log
    }

    pub fn advance(&mut self, to: JobState, reason: impl Into<String>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.log.push(TransitionRecord {
            from: self.current,
            to,
            reason: reason.into(),
            at: Utc::now(),
        });
        self.current = to;
        Ok(())
    }
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
