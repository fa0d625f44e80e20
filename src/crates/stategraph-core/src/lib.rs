//! # stategraph-core - Stateful Workflow Graphs
//!
//! Build workflows as directed graphs of async nodes over a shared JSON
//! state, run them against a checkpointed thread, and pause them for human
//! input at any node.
//!
//! ## Core Concepts
//!
//! ### 1. State and reducers
//!
//! A [`StateSchema`] declares the fields of the state and how concurrent or
//! successive writes combine: [`FieldPolicy::Overwrite`] (last write wins) or
//! [`FieldPolicy::Append`] (lists concatenate). Nodes return *partial*
//! states; the schema merges them into the full state.
//!
//! ### 2. Nodes and edges
//!
//! Each node has exactly one outgoing edge:
//! - **direct** - always go to one successor
//! - **conditional** - a router picks one successor, or several to run in
//!   parallel, from a declared set ([`Route`])
//! - **fan-out** - a router returns one [`Send`] per instance to run; all
//!   instances run concurrently and are joined before the successor
//!
//! A compiled graph can itself be added as a node (a *subgraph*). It runs on
//! its own subordinate thread and hands its output fields back to the parent.
//!
//! ### 3. Threads and checkpoints
//!
//! Every run belongs to a thread. After each step the runtime writes a
//! checkpoint (position + state) through a
//! [`CheckpointSaver`](stategraph_checkpoint::CheckpointSaver); a failure
//! writes nothing, so `RunInput::Continue` retries from the last good step.
//!
//! ### 4. Human-in-the-loop
//!
//! [`NodeContext::interrupt`] suspends the thread with a payload for the
//! caller. `RunInput::Resume(value)` re-enters the node, where the same call
//! now returns `value`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stategraph_core::{RunInput, RunResult, StateGraph, StateSchema, END, START};
//! use serde_json::json;
//!
//! let schema = StateSchema::new().field("draft").field("approved");
//! let mut graph = StateGraph::new(schema);
//!
//! graph.add_node("write", &["draft"], |_state, _ctx| async move {
//!     Ok(json!({ "draft": "hello" }))
//! });
//! graph.add_node("review", &["approved"], |state, ctx| async move {
//!     let answer = ctx.interrupt(json!({ "draft": state["draft"] }))?;
//!     Ok(json!({ "approved": answer == "yes" }))
//! });
//! graph.add_edge(START, "write").add_edge("write", "review").add_edge("review", END);
//!
//! let compiled = graph.compile()?;
//! let result = compiled.run("thread-1", RunInput::Start(json!({}))).await;
//! assert!(matches!(result, RunResult::Suspended(_)));
//!
//! let result = compiled.run("thread-1", RunInput::Resume(json!("yes"))).await;
//! assert_eq!(result.state().unwrap()["approved"], true);
//! ```

pub mod builder;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod runtime;
pub mod send;
pub mod state;

pub use builder::StateGraph;
pub use compiled::{CompiledGraph, RunInput, RunResult, DEFAULT_STEP_LIMIT};
pub use error::{GraphError, Result};
pub use graph::{Graph, NodeId, END, START};
pub use interrupt::{Interrupt, InterruptRequest};
pub use runtime::{NodeContext, ProgressSink, RunContext, TracingSink};
pub use send::{Route, Send};
pub use state::{AppendReducer, FieldPolicy, OverwriteReducer, Reducer, StateError, StateSchema};

pub use stategraph_checkpoint as checkpoint;
