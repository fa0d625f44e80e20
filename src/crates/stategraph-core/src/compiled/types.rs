//! Run API types

use crate::error::GraphError;
use crate::interrupt::Interrupt;
use serde_json::Value;
use stategraph_checkpoint::PendingInterrupt;

/// What a call to `run` asks the thread to do
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    /// Begin a fresh run from the given fields. Allowed on an unknown thread
    /// or one that has reached the end marker.
    Start(Value),

    /// Answer the pending interrupt; the value becomes the return value of
    /// the suspended `interrupt` call.
    Resume(Value),

    /// Pick up from the latest checkpoint without new input, e.g. to retry
    /// after a failure.
    Continue,
}

impl RunInput {
    pub fn kind(&self) -> &'static str {
        match self {
            RunInput::Start(_) => "start",
            RunInput::Resume(_) => "resume",
            RunInput::Continue => "continue",
        }
    }
}

/// Outcome of a call to `run`
#[derive(Debug)]
pub enum RunResult {
    /// A node is waiting for a resume value
    Suspended(Interrupt),

    /// The thread reached the end marker; carries the final state
    Completed(Value),

    /// The run aborted; the last good checkpoint is intact
    Failed(GraphError),
}

impl RunResult {
    pub fn is_suspended(&self) -> bool {
        matches!(self, RunResult::Suspended(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunResult::Failed(_))
    }

    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            RunResult::Suspended(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<&Value> {
        match self {
            RunResult::Completed(state) => Some(state),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&GraphError> {
        match self {
            RunResult::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Turn a failure into an `Err`, keeping the other outcomes.
    pub fn into_result(self) -> Result<RunResult, GraphError> {
        match self {
            RunResult::Failed(error) => Err(error),
            other => Ok(other),
        }
    }
}

/// How one execution of a thread ended, before it is reported to a caller
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(Value),
    Suspended(Interrupt),
}

/// How one node invocation ended
#[derive(Debug)]
pub(crate) enum NodeOutcome {
    Update(Value),
    /// The record persisted with the position, and what the caller sees
    Suspended(PendingInterrupt, Interrupt),
}
