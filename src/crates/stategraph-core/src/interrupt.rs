//! Human-in-the-loop suspension
//!
//! A node suspends by calling [`NodeContext::interrupt`](crate::NodeContext::interrupt)
//! with a payload and propagating the result with `?`:
//!
//! ```rust,ignore
//! graph.add_node("review", &["approved"], |state, ctx| async move {
//!     let answer = ctx.interrupt(json!("confirm?"))?;
//!     Ok(json!({ "approved": answer == "yes" }))
//! });
//! ```
//!
//! The first time through, `interrupt` returns `Err(GraphError::Interrupt(..))`,
//! the node exits, and the run comes back as
//! [`RunResult::Suspended`](crate::RunResult::Suspended) carrying an
//! [`Interrupt`]. Running the thread again with
//! [`RunInput::Resume`](crate::RunInput::Resume) re-executes the node from the
//! top; this time the same `interrupt` call returns the resume value.
//!
//! Calls are matched by position: the k-th `interrupt` call in a node body
//! receives the k-th resume value supplied since the node was first entered.
//! Code before an interrupt runs again on every re-entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stategraph_checkpoint::PendingInterrupt;

/// Signal carried by [`GraphError::Interrupt`](crate::GraphError::Interrupt)
/// from a node body to the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptRequest {
    /// Position of the `interrupt` call within the node body
    pub index: usize,

    pub payload: Value,
}

impl InterruptRequest {
    pub fn new(index: usize, payload: Value) -> Self {
        Self { index, payload }
    }
}

/// A suspension surfaced to the caller of `run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Unique id of this suspension
    pub id: String,

    /// Thread lineage the interrupt was raised in. For interrupts raised
    /// inside a subgraph this is the child lineage, e.g. `session-1/planning`.
    pub thread_id: String,

    /// Node that raised it
    pub node: String,

    /// Value passed to `interrupt`
    pub payload: Value,
}

impl Interrupt {
    pub(crate) fn from_pending(thread_id: &str, pending: &PendingInterrupt) -> Self {
        Self {
            id: pending.id.clone(),
            thread_id: thread_id.to_string(),
            node: pending.node.clone(),
            payload: pending.payload.clone(),
        }
    }
}
