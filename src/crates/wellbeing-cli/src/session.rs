//! Driving a session to completion
//!
//! A session runs the assistant graph on one thread, answering every
//! suspension from a [`FeedbackSource`] until the graph completes or fails.

use crate::error::{AppError, Result};
use crate::prompts;
use async_trait::async_trait;
use colored::Colorize;
use serde_json::Value;
use stategraph_core::{CompiledGraph, RunContext, RunInput, RunResult};
use std::io::Write;

/// Supplies answers to interrupts
#[async_trait]
pub trait FeedbackSource: Send {
    async fn feedback(&mut self, prompt: &Value) -> Result<String>;
}

/// Prints the prompt and reads one line from stdin
#[derive(Debug, Default)]
pub struct ConsoleFeedback;

#[async_trait]
impl FeedbackSource for ConsoleFeedback {
    async fn feedback(&mut self, prompt: &Value) -> Result<String> {
        match prompt {
            Value::String(text) => println!("{}", text),
            other => println!("{}", other),
        }
        print!(
            "Provide your response or type {} if you approve the plan\n> ",
            prompts::NO_FEEDBACK.yellow()
        );
        std::io::stdout().flush()?;
        read_line().await
    }
}

/// Read one line from stdin without blocking the runtime.
pub async fn read_line() -> Result<String> {
    tokio::task::spawn_blocking(|| -> Result<String> {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    })
    .await
    .map_err(|e| AppError::Io(std::io::Error::other(e)))?
}

pub struct Session {
    graph: CompiledGraph,
    thread_id: String,
    ctx: RunContext,
}

impl Session {
    pub fn new(graph: CompiledGraph, thread_id: impl Into<String>, ctx: RunContext) -> Self {
        Self {
            graph,
            thread_id: thread_id.into(),
            ctx,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Whether the thread has a run that has not reached the end.
    pub async fn in_progress(&self) -> Result<bool> {
        let latest = self.graph.latest_checkpoint(&self.thread_id).await?;
        Ok(latest.is_some_and(|c| !c.position.is_end()))
    }

    /// Run with `input`, answering interrupts from `source`, and return the
    /// final state.
    ///
    /// A retryable failure is retried once from the thread's last checkpoint
    /// before it is returned. The retry is granted again after every answered
    /// interrupt.
    #[tracing::instrument(skip_all, fields(thread_id = %self.thread_id, input = input.kind()))]
    pub async fn drive(&self, input: RunInput, source: &mut dyn FeedbackSource) -> Result<Value> {
        let mut result = self.graph.run_with_context(&self.thread_id, input, &self.ctx).await;
        let mut retried = false;

        loop {
            match result {
                RunResult::Completed(state) => return Ok(state),
                RunResult::Failed(error) if error.is_retryable() && !retried => {
                    tracing::warn!(error = %error, "Run failed, retrying from the last checkpoint");
                    self.ctx.log(format!("[Retry] {}. Trying once more...", error));
                    retried = true;
                    result = self
                        .graph
                        .run_with_context(&self.thread_id, RunInput::Continue, &self.ctx)
                        .await;
                }
                RunResult::Failed(error) => return Err(error.into()),
                RunResult::Suspended(interrupt) => {
                    retried = false;
                    tracing::info!(
                        interrupt = %interrupt.id,
                        lineage = %interrupt.thread_id,
                        node = %interrupt.node,
                        "Waiting for feedback"
                    );
                    let answer = source.feedback(&interrupt.payload).await?;
                    result = self
                        .graph
                        .run_with_context(&self.thread_id, RunInput::Resume(Value::String(answer)), &self.ctx)
                        .await;
                }
            }
        }
    }
}
