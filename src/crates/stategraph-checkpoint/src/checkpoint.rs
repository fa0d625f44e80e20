//! Core checkpoint data structures
//!
//! A [`Checkpoint`] is an immutable snapshot of one thread's execution taken
//! after every completed step: where the scheduler will continue
//! ([`Position`]), the full state, and the interrupt that is waiting for an
//! answer, if any.
//!
//! Checkpoints of a thread form an append-only sequence ordered by
//! [`Checkpoint::seq`]. Only the latest one is needed to resume; older entries
//! are kept for inspection and replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a checkpoint
pub type CheckpointId = String;

/// Where execution continues when a thread is next run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Position {
    /// The named node runs next (or is suspended, if the checkpoint carries an
    /// interrupt).
    Node(String),

    /// A set of branches runs concurrently next, then joins.
    Branches(Vec<Branch>),

    /// The thread reached a terminal marker.
    End,
}

impl Position {
    /// Returns `true` if the thread has finished.
    pub fn is_end(&self) -> bool {
        matches!(self, Position::End)
    }

    /// Name of the node this position points at, for a single-node position.
    pub fn node(&self) -> Option<&str> {
        match self {
            Position::Node(name) => Some(name),
            _ => None,
        }
    }
}

/// One pending branch of a fan-out
///
/// `input` is `None` for parallel branches that read the parent state, and
/// `Some` for instances created by a fan-out edge with their own input slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    /// Target node or subgraph
    pub node: String,

    /// Per-instance input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Position of the branch in the list produced by the router
    pub index: usize,
}

impl Branch {
    /// Branch that reads the shared parent state
    pub fn shared(node: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            input: None,
            index,
        }
    }

    /// Branch seeded from its own input
    pub fn with_input(node: impl Into<String>, input: Value, index: usize) -> Self {
        Self {
            node: node.into(),
            input: Some(input),
            index,
        }
    }
}

/// An interrupt waiting for a resume value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingInterrupt {
    /// Unique id of this suspension
    pub id: String,

    /// Node that raised it
    pub node: String,

    /// Which `interrupt` call inside the node body raised it (0-based)
    pub index: usize,

    /// Value surfaced to the caller
    pub payload: Value,

    /// When the interrupt was raised
    pub raised_at: DateTime<Utc>,
}

impl PendingInterrupt {
    pub fn new(node: impl Into<String>, index: usize, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node: node.into(),
            index,
            payload,
            raised_at: Utc::now(),
        }
    }
}

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Initial state supplied by the caller
    Input,
    /// A step of the scheduler loop
    Loop,
    /// A resume value was accepted for a pending interrupt
    Resume,
}

/// Metadata attached to a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointMetadata {
    pub source: CheckpointSource,

    /// Number of steps completed in this thread's current run lineage
    pub step: u64,

    /// Thread this lineage is subordinate to (subgraph or fan-out instance)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_thread: Option<String>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, step: u64) -> Self {
        Self {
            source,
            step,
            parent_thread: None,
        }
    }

    pub fn with_parent_thread(mut self, parent: impl Into<String>) -> Self {
        self.parent_thread = Some(parent.into());
        self
    }
}

/// Snapshot of a thread after a step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Format version
    pub v: i32,

    pub id: CheckpointId,

    pub thread_id: String,

    /// Monotonic sequence number within the thread, starting at 0
    pub seq: u64,

    pub ts: DateTime<Utc>,

    pub position: Position,

    /// Full state object
    pub state: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<PendingInterrupt>,

    /// Resume values already supplied to the node at `position`, in call order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resume_values: Vec<Value>,

    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(
        thread_id: impl Into<String>,
        seq: u64,
        position: Position,
        state: Value,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            seq,
            ts: Utc::now(),
            position,
            state,
            interrupt: None,
            resume_values: Vec::new(),
            metadata,
        }
    }

    pub fn with_interrupt(mut self, interrupt: PendingInterrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn with_resume_values(mut self, values: Vec<Value>) -> Self {
        self.resume_values = values;
        self
    }

    /// Returns `true` if the thread is waiting for a resume value.
    pub fn is_suspended(&self) -> bool {
        self.interrupt.is_some()
    }

    /// Sequence number for the checkpoint that follows this one.
    pub fn next_seq(&self) -> u64 {
        self.seq + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_checkpoint_creation() {
        let checkpoint = Checkpoint::new(
            "thread-1",
            0,
            Position::Node("plan".to_string()),
            json!({"problem": "stress"}),
            CheckpointMetadata::new(CheckpointSource::Input, 0),
        );

        assert_eq!(checkpoint.v, Checkpoint::CURRENT_VERSION);
        assert_eq!(checkpoint.next_seq(), 1);
        assert!(!checkpoint.is_suspended());
        assert_eq!(checkpoint.position.node(), Some("plan"));
    }

    #[test]
    fn test_position_serialization_shape() {
        let position = Position::Branches(vec![
            Branch::shared("web", 0),
            Branch::with_input("consult", json!({"step": 1}), 1),
        ]);

        let value = serde_json::to_value(&position).unwrap();
        assert_eq!(value["kind"], "branches");
        assert_eq!(value["value"][1]["node"], "consult");
        assert!(value["value"][0].get("input").is_none());

        let restored: Position = serde_json::from_value(value).unwrap();
        assert_eq!(restored, position);
        assert!(!restored.is_end());
    }

    #[test]
    fn test_node_and_end_positions_serialize() {
        let node = serde_json::to_value(Position::Node("plan".to_string())).unwrap();
        assert_eq!(node, json!({"kind": "node", "value": "plan"}));
        assert_eq!(serde_json::from_value::<Position>(node).unwrap().node(), Some("plan"));

        let end = serde_json::to_value(Position::End).unwrap();
        assert_eq!(end, json!({"kind": "end"}));
        assert!(serde_json::from_value::<Position>(end).unwrap().is_end());
    }

    #[test]
    fn test_checkpoint_json_round_trip() {
        let checkpoint = Checkpoint::new(
            "thread-1",
            2,
            Position::Node("review".to_string()),
            json!({"problem": "stress"}),
            CheckpointMetadata::new(CheckpointSource::Loop, 2),
        );

        let text = serde_json::to_string(&checkpoint).unwrap();
        let restored: Checkpoint = serde_json::from_str(&text).unwrap();
        assert_eq!(restored.position, checkpoint.position);
        assert_eq!(restored.state, checkpoint.state);
        assert_eq!(restored.seq, 2);
    }

    #[test]
    fn test_interrupt_attached() {
        let checkpoint = Checkpoint::new(
            "thread-1",
            3,
            Position::Node("review".to_string()),
            json!({}),
            CheckpointMetadata::new(CheckpointSource::Loop, 3).with_parent_thread("root"),
        )
        .with_interrupt(PendingInterrupt::new("review", 0, json!("confirm?")));

        assert!(checkpoint.is_suspended());
        assert_eq!(checkpoint.metadata.parent_thread.as_deref(), Some("root"));
        assert_eq!(checkpoint.interrupt.unwrap().payload, json!("confirm?"));
    }
}
