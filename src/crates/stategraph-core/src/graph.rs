//! Graph structure and build-time validation
//!
//! A [`Graph`] is the validated, immutable description a
//! [`CompiledGraph`](crate::CompiledGraph) executes. Nodes live in an arena
//! indexed by name once at build time; every edge target, allowed successor
//! and fan-out target is checked against it before the graph can run.
//!
//! Each node has exactly one outgoing [`Edge`]:
//!
//! - [`Edge::Direct`]: always continue at one node (or [`END`]).
//! - [`Edge::Conditional`]: a router picks one successor from an enumerated
//!   allowed set, or several to run as parallel branches.
//! - [`Edge::FanOut`]: a router produces one input per instance of a fixed
//!   target; instances run concurrently and join at the target's successor.

use crate::compiled::CompiledGraph;
use crate::error::Result;
use crate::runtime::NodeContext;
use crate::send::{self, Route};
use crate::state::{FieldPolicy, StateSchema};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Node identifier, unique within a graph
pub type NodeId = String;

/// Virtual entry node
pub const START: &str = "__start__";

/// Virtual terminal node
pub const END: &str = "__end__";

/// Async node body: current state (or fan-out input) in, partial state out
pub type NodeExecutor = Arc<dyn Fn(Value, NodeContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Router of a conditional edge
pub type RouterFn = Arc<dyn Fn(&Value) -> Route + Send + Sync>;

/// Router of a fan-out edge
pub type FanOutFn = Arc<dyn Fn(&Value) -> Vec<send::Send> + Send + Sync>;

/// What a node runs
#[derive(Clone)]
pub enum NodeKind {
    /// User function with the fields it may write
    Function {
        executor: NodeExecutor,
        writes: Vec<String>,
    },

    /// Compiled graph used as a composite node. Receives the parent fields it
    /// declares and contributes its output fields.
    Subgraph(CompiledGraph),
}

#[derive(Clone)]
pub struct NodeSpec {
    pub name: NodeId,
    pub kind: NodeKind,
}

impl NodeSpec {
    /// Fields this node can contribute to the parent state
    pub fn writes(&self) -> Vec<String> {
        match &self.kind {
            NodeKind::Function { writes, .. } => writes.clone(),
            NodeKind::Subgraph(child) => child.output_fields(),
        }
    }

    pub fn is_subgraph(&self) -> bool {
        matches!(self.kind, NodeKind::Subgraph(_))
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NodeKind::Function { .. } => "function",
            NodeKind::Subgraph(_) => "subgraph",
        };
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("writes", &self.writes())
            .finish()
    }
}

/// Outgoing edge of a node (or of [`START`])
#[derive(Clone)]
pub enum Edge {
    Direct(NodeId),

    Conditional {
        router: RouterFn,
        allowed: Vec<NodeId>,
    },

    FanOut {
        target: NodeId,
        router: FanOutFn,
    },
}

impl Edge {
    /// Every node this edge may lead to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Direct(to) => vec![to.as_str()],
            Edge::Conditional { allowed, .. } => allowed.iter().map(String::as_str).collect(),
            Edge::FanOut { target, .. } => vec![target.as_str()],
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(to) => f.debug_tuple("Direct").field(to).finish(),
            Edge::Conditional { allowed, .. } => f
                .debug_struct("Conditional")
                .field("allowed", allowed)
                .finish(),
            Edge::FanOut { target, .. } => {
                f.debug_struct("FanOut").field("target", target).finish()
            }
        }
    }
}

/// Validated graph structure
#[derive(Debug, Clone)]
pub struct Graph {
    pub schema: StateSchema,
    pub nodes: Vec<NodeSpec>,
    pub index: HashMap<NodeId, usize>,
    pub edges: HashMap<NodeId, Edge>,
    pub output: Option<Vec<String>>,
}

impl Graph {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: HashMap::new(),
            output: None,
        }
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    fn is_target(&self, name: &str) -> bool {
        name == END || self.index.contains_key(name)
    }

    /// Check the structure once, before the graph can run.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.edges.contains_key(START) {
            return Err("no edge leaves the start marker".to_string());
        }

        for field in self.output.iter().flatten() {
            if !self.schema.has_field(field) {
                return Err(format!("output field '{}' is not a state field", field));
            }
        }

        for spec in &self.nodes {
            if !self.edges.contains_key(&spec.name) {
                return Err(format!("node '{}' has no outgoing edge", spec.name));
            }
            for field in spec.writes() {
                if !self.schema.has_field(&field) {
                    return Err(format!(
                        "node '{}' writes '{}', which is not a state field",
                        spec.name, field
                    ));
                }
            }
        }

        let mut sources: Vec<&NodeId> = self.edges.keys().collect();
        sources.sort();
        for from in sources {
            if from != START && !self.index.contains_key(from) {
                return Err(format!("edge source '{}' is not a node", from));
            }
            self.validate_edge(from, &self.edges[from])?;
        }

        self.validate_reachability()
    }

    fn validate_edge(&self, from: &str, edge: &Edge) -> std::result::Result<(), String> {
        match edge {
            Edge::Direct(to) => {
                if !self.is_target(to) {
                    return Err(format!("edge '{}' -> '{}' targets an unknown node", from, to));
                }
            }
            Edge::Conditional { allowed, .. } => {
                if allowed.is_empty() {
                    return Err(format!("conditional edge from '{}' allows no successors", from));
                }
                for to in allowed {
                    if !self.is_target(to) {
                        return Err(format!(
                            "conditional edge from '{}' allows unknown node '{}'",
                            from, to
                        ));
                    }
                }
            }
            Edge::FanOut { target, .. } => {
                let spec = self.node(target).ok_or_else(|| {
                    format!("fan-out edge from '{}' targets unknown node '{}'", from, target)
                })?;
                if !matches!(self.edges.get(target), Some(Edge::Direct(_))) {
                    return Err(format!(
                        "fan-out target '{}' needs a single direct edge to join on",
                        target
                    ));
                }
                for field in spec.writes() {
                    if self.schema.policy(&field) != Some(FieldPolicy::Append) {
                        return Err(format!(
                            "fan-out target '{}' outputs '{}', which is not an append field",
                            target, field
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_reachability(&self) -> std::result::Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::from([START]);
        let mut queue: VecDeque<&str> = VecDeque::from([START]);

        while let Some(current) = queue.pop_front() {
            if let Some(edge) = self.edges.get(current) {
                for target in edge.targets() {
                    if seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }

        for spec in &self.nodes {
            if !seen.contains(spec.name.as_str()) {
                return Err(format!("node '{}' is unreachable from the start marker", spec.name));
            }
        }
        if !seen.contains(END) {
            return Err("no path from the start marker reaches the end marker".to_string());
        }
        Ok(())
    }
}
