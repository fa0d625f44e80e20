//! Error types for graph construction and execution
//!
//! ```text
//! GraphError
//! ├── MalformedGraph     - build-time validation failure (fatal)
//! ├── NodeExecution      - a node body failed (retryable)
//! ├── Routing            - a router chose an undeclared successor (retryable)
//! ├── JoinFailure        - a fan-out branch failed, join discarded (retryable)
//! ├── StepLimitExceeded  - a run took more steps than allowed (retryable)
//! ├── UnknownThread      - resume/continue on a thread with no checkpoint
//! ├── NothingToResume    - resume/continue with nothing pending
//! ├── ThreadInProgress   - start on a thread that has not finished
//! ├── State              - reducer or schema violation
//! ├── Checkpoint         - persistence failure
//! ├── Serialization      - JSON failure
//! └── Interrupt          - control signal raised by `NodeContext::interrupt`
//! ```
//!
//! Only `MalformedGraph` is raised by [`StateGraph::compile`](crate::StateGraph::compile).
//! Everything else comes back from a run as
//! [`RunResult::Failed`](crate::RunResult::Failed). Failures never write a
//! checkpoint, so calling `run` again with
//! [`RunInput::Continue`](crate::RunInput::Continue) retries from the last good
//! one.
//!
//! # Matching errors
//!
//! ```rust
//! use stategraph_core::error::GraphError;
//!
//! fn describe(err: &GraphError) -> String {
//!     match err {
//!         GraphError::NodeExecution { node, error } => format!("{node} failed: {error}"),
//!         GraphError::JoinFailure { branch, .. } => format!("branch {branch} failed"),
//!         other if other.is_retryable() => format!("retry later: {other}"),
//!         other => other.to_string(),
//!     }
//! }
//!
//! let err = GraphError::node_execution("planner", "model timed out");
//! assert_eq!(describe(&err), "planner failed: model timed out");
//! ```

use crate::interrupt::InterruptRequest;
use crate::state::StateError;
use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed at build time
    ///
    /// Raised by `compile` when an edge names an unknown node, a node is
    /// unreachable from the start marker, no path reaches the end marker, a
    /// node declares writes outside the schema, or a fan-out target produces
    /// fields the parent cannot append.
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// A node body returned an error
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// A fan-out branch failed; the outputs of every sibling were discarded
    #[error("Join failed: branch '{branch}' failed: {error}")]
    JoinFailure {
        /// Branch label, `node` or `node[index]`
        branch: String,
        /// Error reported by the failing branch
        error: String,
    },

    /// A router returned a successor outside its declared set, or parallel
    /// branches do not converge on one successor
    #[error("Routing from '{node}' failed: {error}")]
    Routing {
        /// Node whose outgoing edge was being resolved
        node: String,
        error: String,
    },

    /// Resume or continue requested for a thread with no checkpoint
    #[error("Unknown thread '{0}'")]
    UnknownThread(String),

    /// Resume requested while no interrupt is pending, or continue requested
    /// for a finished thread
    #[error("Nothing to resume on thread '{0}'")]
    NothingToResume(String),

    /// Fresh start requested for a thread that has not reached the end
    #[error("Thread '{0}' is still in progress; resume or continue it instead")]
    ThreadInProgress(String),

    /// A single run call executed more steps than the configured limit
    #[error("Step limit of {limit} exceeded")]
    StepLimitExceeded {
        limit: usize,
    },

    /// State schema or reducer violation
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] stategraph_checkpoint::CheckpointError),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Suspension requested from inside a node
    ///
    /// Produced by [`NodeContext::interrupt`](crate::NodeContext::interrupt)
    /// and meant to be propagated with `?`. The scheduler turns it into a
    /// suspended run; it never reaches the caller as a failure.
    #[error("Interrupt requested (call #{})", .0.index)]
    Interrupt(InterruptRequest),
}

impl GraphError {
    /// Create a node execution error with context
    ///
    /// ```rust
    /// use stategraph_core::error::GraphError;
    ///
    /// let err = GraphError::node_execution("llm_call", "API timeout");
    /// assert_eq!(err.to_string(), "Node 'llm_call' execution failed: API timeout");
    /// ```
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn routing(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            error: error.into(),
        }
    }

    pub fn join_failure(branch: impl Into<String>, error: impl Into<String>) -> Self {
        Self::JoinFailure {
            branch: branch.into(),
            error: error.into(),
        }
    }

    /// Whether calling `run` again on the same thread can succeed.
    ///
    /// Build errors and misuse of the run API are not retryable; everything
    /// that aborts a run mid-way is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphError::NodeExecution { .. }
                | GraphError::JoinFailure { .. }
                | GraphError::Routing { .. }
                | GraphError::StepLimitExceeded { .. }
                | GraphError::State(_)
                | GraphError::Checkpoint(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        let err = GraphError::join_failure("consultation[2]", "search down");
        assert_eq!(
            err.to_string(),
            "Join failed: branch 'consultation[2]' failed: search down"
        );

        let err = GraphError::Interrupt(InterruptRequest::new(1, json!("again?")));
        assert_eq!(err.to_string(), "Interrupt requested (call #1)");
    }

    #[test]
    fn test_retryable() {
        assert!(GraphError::node_execution("a", "boom").is_retryable());
        assert!(GraphError::StepLimitExceeded { limit: 25 }.is_retryable());
        assert!(!GraphError::MalformedGraph("x".into()).is_retryable());
        assert!(!GraphError::UnknownThread("t".into()).is_retryable());
        assert!(!GraphError::NothingToResume("t".into()).is_retryable());
    }
}
