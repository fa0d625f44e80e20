//! Fan-out and join
//!
//! A `Branches` position runs every branch on its own tokio task and merges
//! the results into the parent state in completion order. The join is
//! all-or-nothing: the first failure aborts the remaining tasks and the
//! parent state is left untouched. Because the branch list lives in the
//! checkpoint, a retry re-runs the same tasks without consulting the router
//! again.
//!
//! Subgraph branches run on subordinate lineages: `<parent>/<node>` for
//! parallel branches over the shared state, `<parent>/<node>[i]` for fan-out
//! instances. A lineage left unfinished by a failed join is continued rather
//! than restarted on retry.

use super::execution::{check_writes, node_error};
use super::types::{Outcome, RunInput};
use super::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::NodeKind;
use crate::runtime::{NodeContext, RunContext};
use serde_json::Value;
use stategraph_checkpoint::{Branch, CheckpointSaver};
use std::sync::Arc;
use tokio::task::JoinSet;

impl CompiledGraph {
    pub(crate) async fn run_branches(
        &self,
        saver: &Arc<dyn CheckpointSaver>,
        thread_id: &str,
        branches: &[Branch],
        state: &Value,
        ctx: &RunContext,
    ) -> Result<Value> {
        tracing::debug!(thread_id, branches = branches.len(), "Spawning branches");

        let mut tasks = JoinSet::new();
        for branch in branches {
            let graph = self.clone();
            let saver = saver.clone();
            let parent_thread = thread_id.to_string();
            let branch = branch.clone();
            let parent_state = state.clone();
            let ctx = ctx.clone();

            tasks.spawn(async move {
                let label = branch_label(&branch);
                let result = graph
                    .run_branch(&saver, &parent_thread, &branch, parent_state, &ctx)
                    .await;
                (label, result)
            });
        }

        let mut merged = state.clone();
        while let Some(joined) = tasks.join_next().await {
            let (label, result) = joined
                .map_err(|e| GraphError::join_failure("<task>", format!("branch task panicked: {}", e)))?;

            let partial = match result {
                Ok(partial) => partial,
                Err(e) => {
                    tracing::warn!(thread_id, branch = %label, error = %e, "Branch failed, discarding join");
                    tasks.abort_all();
                    return Err(GraphError::join_failure(label, e.to_string()));
                }
            };

            merged = self
                .graph
                .schema
                .merge(&merged, &partial)
                .map_err(|e| GraphError::join_failure(&label, e.to_string()))?;
            tracing::debug!(thread_id, branch = %label, "Branch merged");
        }

        Ok(merged)
    }

    async fn run_branch(
        &self,
        saver: &Arc<dyn CheckpointSaver>,
        parent_thread: &str,
        branch: &Branch,
        parent_state: Value,
        ctx: &RunContext,
    ) -> Result<Value> {
        let spec = self.node(&branch.node)?;

        match &spec.kind {
            NodeKind::Function { executor, writes } => {
                let state = branch.input.clone().unwrap_or(parent_state);
                let node_ctx = NodeContext::new(&branch.node, parent_thread, 0, ctx.clone(), Vec::new());

                match executor(state, node_ctx).await {
                    Ok(partial) => {
                        check_writes(&branch.node, writes, &partial)?;
                        Ok(partial)
                    }
                    Err(GraphError::Interrupt(_)) => Err(GraphError::node_execution(
                        &branch.node,
                        "interrupts are not supported inside parallel branches",
                    )),
                    Err(e) => Err(node_error(&branch.node, e)),
                }
            }

            NodeKind::Subgraph(child) => {
                let child_thread = match branch.input {
                    Some(_) => format!("{}/{}[{}]", parent_thread, branch.node, branch.index),
                    None => format!("{}/{}", parent_thread, branch.node),
                };

                let input = match saver.get_latest(&child_thread).await? {
                    Some(latest) if !latest.position.is_end() => RunInput::Continue,
                    _ => RunInput::Start(match &branch.input {
                        Some(input) => input.clone(),
                        None => child.schema().project(&parent_state),
                    }),
                };

                match child.execute(saver, &child_thread, Some(parent_thread), input, ctx).await? {
                    Outcome::Completed(state) => Ok(child.output(&state)),
                    Outcome::Suspended(interrupt) => Err(GraphError::node_execution(
                        &branch.node,
                        format!(
                            "interrupt raised in '{}' is not supported inside a fan-out",
                            interrupt.thread_id
                        ),
                    )),
                }
            }
        }
    }
}

fn branch_label(branch: &Branch) -> String {
    match branch.input {
        Some(_) => format!("{}[{}]", branch.node, branch.index),
        None => branch.node.clone(),
    }
}
