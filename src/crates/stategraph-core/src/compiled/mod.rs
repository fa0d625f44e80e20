//! Compiled graph runtime
//!
//! A [`CompiledGraph`] executes a validated [`Graph`] as a position-indexed
//! state machine over the positions stored in checkpoints
//! (`Node`, `Branches`, `End`). Every call to [`run`](CompiledGraph::run):
//!
//! 1. loads the latest checkpoint of the thread,
//! 2. applies the [`RunInput`] (fresh start, resume value, or plain continue),
//! 3. executes one position at a time, merging partial states through the
//!    schema and writing a checkpoint after every step,
//! 4. stops at the end marker, at an interrupt, or at the first failure.
//!
//! Failures write nothing, so the latest checkpoint is always the last good
//! one and `run(thread, RunInput::Continue)` retries from it.
//!
//! ```rust,ignore
//! let compiled = graph.compile()?.with_checkpointer(Arc::new(saver));
//!
//! let mut result = compiled.run("session-1", RunInput::Start(json!({"problem": p}))).await;
//! while let RunResult::Suspended(interrupt) = &result {
//!     let answer = ask_user(&interrupt.payload);
//!     result = compiled.run("session-1", RunInput::Resume(json!(answer))).await;
//! }
//! ```

mod execution;
mod fanout;
#[cfg(test)]
mod tests;
mod types;

pub use types::{RunInput, RunResult};

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeSpec, END};
use crate::state::{select_fields, StateSchema};
use futures::TryStreamExt;
use serde_json::Value;
use stategraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    InMemoryCheckpointSaver, Position,
};
use std::fmt;
use std::sync::Arc;

/// Steps a single `run` call may execute before it fails
pub const DEFAULT_STEP_LIMIT: usize = 25;

/// Executable graph
///
/// Cheap to clone; clones share the graph structure and the checkpointer.
#[derive(Clone)]
pub struct CompiledGraph {
    graph: Arc<Graph>,
    checkpointer: Arc<dyn CheckpointSaver>,
    step_limit: usize,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
            checkpointer: Arc::new(InMemoryCheckpointSaver::new()),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Persist checkpoints through `saver` instead of the in-memory default.
    ///
    /// When this graph runs as a subgraph, the parent's checkpointer is used.
    pub fn with_checkpointer(mut self, saver: Arc<dyn CheckpointSaver>) -> Self {
        self.checkpointer = saver;
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn checkpointer(&self) -> &Arc<dyn CheckpointSaver> {
        &self.checkpointer
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn schema(&self) -> &StateSchema {
        &self.graph.schema
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.graph.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Fields handed back to a parent: the declared output, or every field.
    pub fn output_fields(&self) -> Vec<String> {
        match &self.graph.output {
            Some(fields) => fields.clone(),
            None => self.graph.schema.field_names().map(String::from).collect(),
        }
    }

    pub(crate) fn output(&self, state: &Value) -> Value {
        select_fields(state, &self.output_fields())
    }

    /// Latest checkpoint of a thread, if any.
    pub async fn latest_checkpoint(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpointer.get_latest(thread_id).await?)
    }

    /// Checkpoints of a thread, newest first.
    pub async fn history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>> {
        let stream = self.checkpointer.list(thread_id, limit).await?;
        Ok(stream.try_collect().await?)
    }

    pub(crate) fn node(&self, name: &str) -> Result<&NodeSpec> {
        self.graph.node(name).ok_or_else(|| {
            GraphError::Checkpoint(CheckpointError::Invalid(format!(
                "checkpoint refers to node '{}', which this graph does not have",
                name
            )))
        })
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("nodes", &self.node_names())
            .field("output", &self.graph.output)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

/// Position a single successor name maps to
pub(crate) fn position_for(node: &str) -> Position {
    if node == END {
        Position::End
    } else {
        Position::Node(node.to_string())
    }
}

/// Metadata for a checkpoint; subordinate lineages record their parent
/// thread.
pub(crate) fn metadata_for(parent: Option<&str>, source: CheckpointSource, step: u64) -> CheckpointMetadata {
    let metadata = CheckpointMetadata::new(source, step);
    match parent {
        Some(parent) => metadata.with_parent_thread(parent),
        None => metadata,
    }
}
