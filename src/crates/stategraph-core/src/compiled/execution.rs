//! Scheduler loop
//!
//! Drives a thread from its latest checkpoint until it ends, suspends, or
//! fails. Within one thread nodes run strictly one after another; only
//! `Branches` positions run work concurrently (see `fanout`).

use super::types::{NodeOutcome, Outcome, RunInput, RunResult};
use super::{metadata_for, position_for, CompiledGraph};
use crate::error::{GraphError, Result};
use crate::graph::{Edge, NodeKind, END, START};
use crate::interrupt::Interrupt;
use crate::runtime::{NodeContext, RunContext};
use crate::send::Route;
use crate::state::StateError;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use stategraph_checkpoint::{
    Branch, Checkpoint, CheckpointSaver, CheckpointSource, PendingInterrupt, Position,
};
use std::collections::HashSet;
use std::sync::Arc;

impl CompiledGraph {
    /// Run a thread with a fresh [`RunContext`].
    pub async fn run(&self, thread_id: &str, input: RunInput) -> RunResult {
        self.run_with_context(thread_id, input, &RunContext::new())
            .await
    }

    /// Run a thread, reporting progress through `ctx`.
    ///
    /// - `Start` on an unknown or finished thread begins at the start marker;
    ///   on a thread still in progress it fails with `ThreadInProgress`.
    /// - `Resume` needs a pending interrupt (`NothingToResume` otherwise) and
    ///   re-enters the suspended node with the value.
    /// - `Continue` picks up from the latest checkpoint; on a finished thread
    ///   it fails with `NothingToResume`.
    ///
    /// `Resume` and `Continue` on a thread with no checkpoint fail with
    /// `UnknownThread`.
    #[tracing::instrument(skip(self, input, ctx), fields(input = input.kind()))]
    pub async fn run_with_context(
        &self,
        thread_id: &str,
        input: RunInput,
        ctx: &RunContext,
    ) -> RunResult {
        tracing::info!("Starting graph run");

        match self.execute(&self.checkpointer, thread_id, None, input, ctx).await {
            Ok(Outcome::Completed(state)) => {
                tracing::info!("Graph run completed");
                RunResult::Completed(state)
            }
            Ok(Outcome::Suspended(interrupt)) => {
                tracing::info!(node = %interrupt.node, "Graph run suspended");
                RunResult::Suspended(interrupt)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Graph run failed");
                RunResult::Failed(e)
            }
        }
    }

    /// One run of `thread_id` against `saver`. Subgraphs and fan-out
    /// instances re-enter here with the parent's saver, a child thread id and
    /// the parent thread it belongs to.
    pub(crate) fn execute<'a>(
        &'a self,
        saver: &'a Arc<dyn CheckpointSaver>,
        thread_id: &'a str,
        parent: Option<&'a str>,
        input: RunInput,
        ctx: &'a RunContext,
    ) -> BoxFuture<'a, Result<Outcome>> {
        Box::pin(async move {
            let (mut current, mut forward) = self.prepare(saver, thread_id, parent, input).await?;
            let mut steps = 0usize;

            loop {
                let (position, state) = match &current.position {
                    Position::End => return Ok(Outcome::Completed(current.state.clone())),

                    Position::Node(name) => {
                        self.count_step(&mut steps)?;
                        let outcome = self
                            .run_node(saver, thread_id, name, &current, forward.take(), ctx)
                            .await?;

                        match outcome {
                            NodeOutcome::Update(partial) => {
                                let state = self.graph.schema.merge(&current.state, &partial)?;
                                let position = self.resolve(name, &state)?;
                                (position, state)
                            }
                            NodeOutcome::Suspended(pending, interrupt) => {
                                let checkpoint = Checkpoint::new(
                                    thread_id,
                                    current.next_seq(),
                                    current.position.clone(),
                                    current.state.clone(),
                                    metadata_for(parent, CheckpointSource::Loop, current.metadata.step),
                                )
                                .with_interrupt(pending)
                                .with_resume_values(current.resume_values.clone());
                                saver.put(checkpoint).await?;
                                return Ok(Outcome::Suspended(interrupt));
                            }
                        }
                    }

                    Position::Branches(branches) => {
                        self.count_step(&mut steps)?;
                        let state = self
                            .run_branches(saver, thread_id, branches, &current.state, ctx)
                            .await?;
                        let position = self.join_successor(branches)?;
                        (position, state)
                    }
                };

                let checkpoint = Checkpoint::new(
                    thread_id,
                    current.next_seq(),
                    position,
                    state,
                    metadata_for(parent, CheckpointSource::Loop, current.metadata.step + 1),
                );
                saver.put(checkpoint.clone()).await?;
                current = checkpoint;
            }
        })
    }

    /// Apply the run input to the thread's latest checkpoint and return the
    /// checkpoint to continue from, plus a resume value to forward into a
    /// suspended subgraph.
    async fn prepare(
        &self,
        saver: &Arc<dyn CheckpointSaver>,
        thread_id: &str,
        parent: Option<&str>,
        input: RunInput,
    ) -> Result<(Checkpoint, Option<Value>)> {
        let latest = saver.get_latest(thread_id).await?;

        match input {
            RunInput::Start(input) => {
                if let Some(latest) = &latest {
                    if !latest.position.is_end() {
                        return Err(GraphError::ThreadInProgress(thread_id.to_string()));
                    }
                }

                let state = self.graph.schema.initial_state(&input)?;
                let position = self.resolve(START, &state)?;
                let checkpoint = Checkpoint::new(
                    thread_id,
                    latest.as_ref().map(Checkpoint::next_seq).unwrap_or(0),
                    position,
                    state,
                    metadata_for(parent, CheckpointSource::Input, 0),
                );
                tracing::debug!(thread_id, seq = checkpoint.seq, "Fresh thread state");
                saver.put(checkpoint.clone()).await?;
                Ok((checkpoint, None))
            }

            RunInput::Resume(value) => {
                let latest =
                    latest.ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))?;
                let Some(pending) = &latest.interrupt else {
                    return Err(GraphError::NothingToResume(thread_id.to_string()));
                };
                let name = latest
                    .position
                    .node()
                    .ok_or_else(|| GraphError::NothingToResume(thread_id.to_string()))?;

                let mut resume_values = latest.resume_values.clone();
                let mut forward = None;
                match &self.node(name)?.kind {
                    NodeKind::Function { .. } => resume_values.push(value),
                    NodeKind::Subgraph(_) => forward = Some(value),
                }
                tracing::debug!(thread_id, node = name, interrupt = %pending.id, "Resuming");

                let checkpoint = Checkpoint::new(
                    thread_id,
                    latest.next_seq(),
                    latest.position.clone(),
                    latest.state.clone(),
                    metadata_for(parent, CheckpointSource::Resume, latest.metadata.step),
                )
                .with_resume_values(resume_values);
                saver.put(checkpoint.clone()).await?;
                Ok((checkpoint, forward))
            }

            RunInput::Continue => {
                let latest =
                    latest.ok_or_else(|| GraphError::UnknownThread(thread_id.to_string()))?;
                if latest.position.is_end() {
                    return Err(GraphError::NothingToResume(thread_id.to_string()));
                }
                Ok((latest, None))
            }
        }
    }

    fn count_step(&self, steps: &mut usize) -> Result<()> {
        if *steps >= self.step_limit {
            return Err(GraphError::StepLimitExceeded {
                limit: self.step_limit,
            });
        }
        *steps += 1;
        Ok(())
    }

    async fn run_node(
        &self,
        saver: &Arc<dyn CheckpointSaver>,
        thread_id: &str,
        name: &str,
        current: &Checkpoint,
        forward: Option<Value>,
        ctx: &RunContext,
    ) -> Result<NodeOutcome> {
        let spec = self.node(name)?;
        tracing::debug!(thread_id, node = name, step = current.metadata.step, "Executing node");

        match &spec.kind {
            NodeKind::Function { executor, writes } => {
                let node_ctx = NodeContext::new(
                    name,
                    thread_id,
                    current.metadata.step,
                    ctx.clone(),
                    current.resume_values.clone(),
                );

                match executor(current.state.clone(), node_ctx).await {
                    Ok(partial) => {
                        check_writes(name, writes, &partial)?;
                        Ok(NodeOutcome::Update(partial))
                    }
                    Err(GraphError::Interrupt(request)) => {
                        let pending = PendingInterrupt::new(name, request.index, request.payload);
                        let interrupt = Interrupt::from_pending(thread_id, &pending);
                        Ok(NodeOutcome::Suspended(pending, interrupt))
                    }
                    Err(e) => {
                        tracing::warn!(thread_id, node = name, error = %e, "Node failed");
                        Err(node_error(name, e))
                    }
                }
            }

            NodeKind::Subgraph(child) => {
                let child_thread = format!("{}/{}", thread_id, name);
                let child_latest = saver.get_latest(&child_thread).await?;

                let input = match (&child_latest, forward) {
                    (Some(latest), Some(value)) if latest.is_suspended() => RunInput::Resume(value),
                    (Some(latest), _) if !latest.position.is_end() => RunInput::Continue,
                    _ => RunInput::Start(child.schema().project(&current.state)),
                };
                tracing::debug!(thread_id, node = name, child_input = input.kind(), "Entering subgraph");

                match child.execute(saver, &child_thread, Some(thread_id), input, ctx).await? {
                    Outcome::Completed(state) => Ok(NodeOutcome::Update(child.output(&state))),
                    Outcome::Suspended(interrupt) => {
                        let pending = PendingInterrupt {
                            id: interrupt.id.clone(),
                            node: name.to_string(),
                            index: 0,
                            payload: interrupt.payload.clone(),
                            raised_at: Utc::now(),
                        };
                        Ok(NodeOutcome::Suspended(pending, interrupt))
                    }
                }
            }
        }
    }

    /// Resolve the outgoing edge of `from` against the post-merge state.
    pub(crate) fn resolve(&self, from: &str, state: &Value) -> Result<Position> {
        let edge = self
            .graph
            .edges
            .get(from)
            .ok_or_else(|| GraphError::routing(from, "no outgoing edge"))?;

        match edge {
            Edge::Direct(to) => Ok(position_for(to)),

            Edge::Conditional { router, allowed } => {
                let check = |to: &str| -> Result<()> {
                    if allowed.iter().any(|a| a == to) {
                        Ok(())
                    } else {
                        Err(GraphError::routing(
                            from,
                            format!("router chose '{}', allowed: {:?}", to, allowed),
                        ))
                    }
                };

                match router(state) {
                    Route::To(to) => {
                        check(to.as_str())?;
                        Ok(position_for(&to))
                    }
                    Route::Many(targets) => {
                        if targets.is_empty() {
                            return Err(GraphError::routing(from, "router chose no successors"));
                        }
                        let mut seen = HashSet::new();
                        for to in &targets {
                            check(to.as_str())?;
                            if targets.len() > 1 && to == END {
                                return Err(GraphError::routing(
                                    from,
                                    "the end marker cannot run as a parallel branch",
                                ));
                            }
                            if !seen.insert(to.as_str()) {
                                return Err(GraphError::routing(
                                    from,
                                    format!("branch '{}' chosen twice", to),
                                ));
                            }
                        }
                        if targets.len() == 1 {
                            return Ok(position_for(&targets[0]));
                        }
                        Ok(Position::Branches(
                            targets
                                .into_iter()
                                .enumerate()
                                .map(|(index, node)| Branch::shared(node, index))
                                .collect(),
                        ))
                    }
                }
            }

            Edge::FanOut { target, router } => {
                let sends = router(state);
                if sends.is_empty() {
                    tracing::debug!(node = from, target = %target, "Empty fan-out joins immediately");
                    return self.join_successor(&[Branch::shared(target.clone(), 0)]);
                }

                let mut branches = Vec::with_capacity(sends.len());
                for (index, send) in sends.into_iter().enumerate() {
                    let (node, arg) = send.into_parts();
                    if node != *target {
                        return Err(GraphError::routing(
                            from,
                            format!("fan-out to '{}' produced a task for '{}'", target, node),
                        ));
                    }
                    self.check_fan_out_input(target, &arg)
                        .map_err(|e| GraphError::routing(from, format!("task {}: {}", index, e)))?;
                    branches.push(Branch::with_input(node, arg, index));
                }
                Ok(Position::Branches(branches))
            }
        }
    }

    /// The single direct successor every branch converges on.
    pub(crate) fn join_successor(&self, branches: &[Branch]) -> Result<Position> {
        let mut successor: Option<&str> = None;
        for branch in branches {
            match self.graph.edges.get(&branch.node) {
                Some(Edge::Direct(to)) => match successor {
                    None => successor = Some(to.as_str()),
                    Some(existing) if existing == to.as_str() => {}
                    Some(existing) => {
                        return Err(GraphError::routing(
                            &branch.node,
                            format!("parallel branches do not converge ('{}' vs '{}')", existing, to),
                        ))
                    }
                },
                _ => {
                    return Err(GraphError::routing(
                        &branch.node,
                        "a parallel branch needs a single direct successor",
                    ))
                }
            }
        }

        successor
            .map(position_for)
            .ok_or_else(|| GraphError::routing(START, "no branches to join"))
    }

    fn check_fan_out_input(&self, target: &str, arg: &Value) -> Result<()> {
        match &self.node(target)?.kind {
            NodeKind::Subgraph(child) => Ok(child.schema().check_partial(arg)?),
            NodeKind::Function { .. } if arg.is_object() || arg.is_null() => Ok(()),
            NodeKind::Function { .. } => {
                Err(StateError::NotAnObject("non-object fan-out input".to_string()).into())
            }
        }
    }
}

/// Reject partial states with fields the node did not declare.
pub(crate) fn check_writes(node: &str, writes: &[String], partial: &Value) -> Result<()> {
    match partial {
        Value::Null => Ok(()),
        Value::Object(map) => {
            for field in map.keys() {
                if !writes.contains(field) {
                    return Err(StateError::UndeclaredWrite {
                        node: node.to_string(),
                        field: field.clone(),
                    }
                    .into());
                }
            }
            Ok(())
        }
        _ => Err(GraphError::node_execution(
            node,
            "node must return an object or null",
        )),
    }
}

/// Classify an error raised by a node body as a node failure.
pub(crate) fn node_error(node: &str, error: GraphError) -> GraphError {
    match error {
        GraphError::NodeExecution { .. } => error,
        other => GraphError::node_execution(node, other.to_string()),
    }
}
