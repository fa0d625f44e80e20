//! [`StateGraph`] builder
//!
//! Declare the state schema, add nodes and edges, then [`compile`](StateGraph::compile).
//! Mistakes made while building (duplicate names, a second outgoing edge,
//! reserved names) are collected and reported by `compile` together with the
//! structural validation, as [`GraphError::MalformedGraph`].
//!
//! ```rust
//! use stategraph_core::{StateGraph, StateSchema, Route, END, START};
//! use serde_json::{json, Value};
//!
//! let schema = StateSchema::new().field("question").append_field("answers");
//! let mut graph = StateGraph::new(schema);
//!
//! graph.add_node("ask", &["answers"], |state: Value, _ctx| async move {
//!     Ok(json!({ "answers": [format!("re: {}", state["question"])] }))
//! });
//! graph.add_edge(START, "ask");
//! graph.add_conditional_edges(
//!     "ask",
//!     |state: &Value| {
//!         if state["answers"].as_array().map_or(0, Vec::len) < 2 {
//!             Route::to("ask")
//!         } else {
//!             Route::to(END)
//!         }
//!     },
//!     &["ask", END],
//! );
//!
//! let compiled = graph.compile().unwrap();
//! assert_eq!(compiled.node_names(), vec!["ask"]);
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, NodeId, NodeKind, NodeSpec, END, START};
use crate::runtime::NodeContext;
use crate::send::{self, Route};
use crate::state::StateSchema;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Builder for a stateful workflow graph
pub struct StateGraph {
    graph: Graph,
    errors: Vec<String>,
}

impl StateGraph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            graph: Graph::new(schema),
            errors: Vec::new(),
        }
    }

    pub fn schema(&self) -> &StateSchema {
        &self.graph.schema
    }

    /// Add a function node.
    ///
    /// `writes` lists the state fields the node may return. A returned partial
    /// with any other field fails the node.
    pub fn add_node<F, Fut>(&mut self, name: impl Into<NodeId>, writes: &[&str], f: F) -> &mut Self
    where
        F: Fn(Value, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let executor = Arc::new(move |state: Value, ctx: NodeContext| f(state, ctx).boxed());
        self.insert_node(NodeSpec {
            name: name.into(),
            kind: NodeKind::Function {
                executor,
                writes: writes.iter().map(|w| w.to_string()).collect(),
            },
        })
    }

    /// Add a compiled graph as a composite node.
    ///
    /// The subgraph runs on its own lineage `<thread>/<name>`, receives the
    /// parent fields its schema declares, and returns its output fields.
    pub fn add_subgraph(&mut self, name: impl Into<NodeId>, subgraph: CompiledGraph) -> &mut Self {
        self.insert_node(NodeSpec {
            name: name.into(),
            kind: NodeKind::Subgraph(subgraph),
        })
    }

    fn insert_node(&mut self, spec: NodeSpec) -> &mut Self {
        if spec.name == START || spec.name == END {
            self.errors.push(format!("'{}' is a reserved node name", spec.name));
        } else if self.graph.index.contains_key(&spec.name) {
            self.errors.push(format!("node '{}' is defined twice", spec.name));
        } else {
            self.graph.index.insert(spec.name.clone(), self.graph.nodes.len());
            self.graph.nodes.push(spec);
        }
        self
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> &mut Self {
        let to = to.into();
        if to == START {
            self.errors.push("edges cannot target the start marker".to_string());
            return self;
        }
        self.insert_edge(from.into(), Edge::Direct(to))
    }

    /// Route from `from` with `router`, which must only return names in
    /// `allowed` (nodes or [`END`]).
    pub fn add_conditional_edges<F>(
        &mut self,
        from: impl Into<NodeId>,
        router: F,
        allowed: &[&str],
    ) -> &mut Self
    where
        F: Fn(&Value) -> Route + Send + Sync + 'static,
    {
        self.insert_edge(
            from.into(),
            Edge::Conditional {
                router: Arc::new(router),
                allowed: allowed.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    /// Fan out from `from` to one instance of `target` per [`Send`](send::Send) returned
    /// by `router`. Instances join at `target`'s direct successor.
    pub fn add_fan_out_edge<F>(
        &mut self,
        from: impl Into<NodeId>,
        target: impl Into<NodeId>,
        router: F,
    ) -> &mut Self
    where
        F: Fn(&Value) -> Vec<send::Send> + Send + Sync + 'static,
    {
        self.insert_edge(
            from.into(),
            Edge::FanOut {
                target: target.into(),
                router: Arc::new(router),
            },
        )
    }

    fn insert_edge(&mut self, from: NodeId, edge: Edge) -> &mut Self {
        if from == END {
            self.errors.push("edges cannot leave the end marker".to_string());
        } else if self.graph.edges.contains_key(&from) {
            self.errors.push(format!("'{}' already has an outgoing edge", from));
        } else {
            self.graph.edges.insert(from, edge);
        }
        self
    }

    /// Restrict what this graph hands back when used as a subgraph.
    pub fn with_output(&mut self, fields: &[&str]) -> &mut Self {
        self.graph.output = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<CompiledGraph> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(GraphError::MalformedGraph(first));
        }
        self.graph.validate().map_err(GraphError::MalformedGraph)?;

        tracing::debug!(
            nodes = self.graph.nodes.len(),
            edges = self.graph.edges.len(),
            "Graph compiled"
        );
        Ok(CompiledGraph::new(self.graph))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_noop(graph: &mut StateGraph, name: &str, writes: &[&str]) {
        graph.add_node(name, writes, |_state, _ctx| async { Ok(Value::Null) });
    }

    fn schema() -> StateSchema {
        StateSchema::new().field("x").append_field("items")
    }

    fn malformed(graph: StateGraph) -> String {
        match graph.compile() {
            Err(GraphError::MalformedGraph(msg)) => msg,
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("graph compiled"),
        }
    }

    #[test]
    fn test_linear_graph_compiles() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &["x"]);
        graph.add_edge(START, "a").add_edge("a", END);
        assert!(graph.compile().is_ok());
    }

    #[test]
    fn test_unknown_edge_target() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        graph.add_edge(START, "a").add_edge("a", "b");
        assert!(malformed(graph).contains("unknown node"));
    }

    #[test]
    fn test_conditional_allowed_set_checked() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        graph.add_edge(START, "a");
        graph.add_conditional_edges("a", |_: &Value| Route::to(END), &["missing", END]);
        assert!(malformed(graph).contains("missing"));
    }

    #[test]
    fn test_unreachable_node() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        add_noop(&mut graph, "orphan", &[]);
        graph.add_edge(START, "a").add_edge("a", END).add_edge("orphan", END);
        assert!(malformed(graph).contains("unreachable"));
    }

    #[test]
    fn test_no_path_to_end() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        graph.add_edge(START, "a").add_edge("a", "a");
        assert!(malformed(graph).contains("end marker"));
    }

    #[test]
    fn test_undeclared_write() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &["plan"]);
        graph.add_edge(START, "a").add_edge("a", END);
        assert!(malformed(graph).contains("'plan'"));
    }

    #[test]
    fn test_duplicate_node_and_edge() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        add_noop(&mut graph, "a", &[]);
        graph.add_edge(START, "a").add_edge("a", END);
        assert!(malformed(graph).contains("defined twice"));

        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "a", &[]);
        graph.add_edge(START, "a").add_edge("a", END).add_edge("a", "a");
        assert!(malformed(graph).contains("already has an outgoing edge"));
    }

    #[test]
    fn test_fan_out_target_must_append() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, "split", &[]);
        add_noop(&mut graph, "worker", &["x"]);
        graph.add_edge(START, "split");
        graph.add_fan_out_edge("split", "worker", |_: &Value| vec![send::Send::new("worker", json!({}))]);
        graph.add_edge("worker", END);
        assert!(malformed(graph).contains("not an append field"));
    }

    #[test]
    fn test_fan_out_subgraph_output_must_append() {
        let child_schema = StateSchema::new().field("step").field("section");
        let mut child = StateGraph::new(child_schema);
        add_noop(&mut child, "write", &["section"]);
        child.add_edge(START, "write").add_edge("write", END);
        child.with_output(&["section"]);
        let child = child.compile().unwrap();

        let parent_schema = StateSchema::new().field("section").append_field("items");
        let mut graph = StateGraph::new(parent_schema);
        add_noop(&mut graph, "split", &[]);
        graph.add_subgraph("consult", child);
        graph.add_edge(START, "split");
        graph.add_fan_out_edge("split", "consult", |_: &Value| Vec::new());
        graph.add_edge("consult", END);
        assert!(malformed(graph).contains("'section'"));
    }

    #[test]
    fn test_reserved_names() {
        let mut graph = StateGraph::new(schema());
        add_noop(&mut graph, END, &[]);
        graph.add_edge(START, END);
        assert!(malformed(graph).contains("reserved"));
    }
}
