//! Routing decisions returned by conditional and fan-out edges
//!
//! A conditional edge's router inspects the post-merge state and returns a
//! [`Route`]: one successor, or several successors that run as parallel
//! branches and join at their common static successor.
//!
//! A fan-out edge's router returns a list of [`Send`]s, one per instance of the
//! edge's target. Each instance starts from its own input and runs on its own
//! checkpoint lineage; their outputs are appended to the parent state once all
//! of them have finished.
//!
//! ```rust
//! use stategraph_core::{Route, Send, END};
//! use serde_json::{json, Value};
//!
//! fn after_review(state: &Value) -> Route {
//!     if state["approved"] == true {
//!         Route::to(END)
//!     } else {
//!         Route::many(["web_research", "wiki_research"])
//!     }
//! }
//!
//! fn per_step(state: &Value) -> Vec<Send> {
//!     state["steps"]
//!         .as_array()
//!         .into_iter()
//!         .flatten()
//!         .map(|step| Send::new("consultation", json!({ "step": step })))
//!         .collect()
//! }
//!
//! assert_eq!(after_review(&json!({"approved": true})), Route::To(END.to_string()));
//! assert_eq!(per_step(&json!({"steps": ["a", "b"]})).len(), 2);
//! ```

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successor(s) chosen by a conditional edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Continue at one node, or finish with [`END`](crate::END)
    To(NodeId),

    /// Run the listed nodes concurrently on the current state, then join
    Many(Vec<NodeId>),
}

impl Route {
    pub fn to(node: impl Into<NodeId>) -> Self {
        Route::To(node.into())
    }

    pub fn many<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Route::Many(nodes.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Route {
    fn from(node: &str) -> Self {
        Route::To(node.to_string())
    }
}

impl From<String> for Route {
    fn from(node: String) -> Self {
        Route::To(node)
    }
}

/// One fan-out instance: the target and the input it starts from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub node: NodeId,
    pub arg: Value,
}

impl Send {
    pub fn new(node: impl Into<NodeId>, arg: Value) -> Self {
        Self {
            node: node.into(),
            arg,
        }
    }

    pub fn into_parts(self) -> (NodeId, Value) {
        (self.node, self.arg)
    }
}
