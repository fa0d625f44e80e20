//! Run and node contexts
//!
//! A [`RunContext`] is created by the caller for one logical session and
//! carries the start instant plus a [`ProgressSink`] for human-readable
//! progress messages. There is no global timer or logger; nodes reach both
//! through the [`NodeContext`] the scheduler hands them.
//!
//! ```rust
//! use stategraph_core::runtime::{ProgressSink, RunContext};
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<String>>);
//!
//! impl ProgressSink for Collect {
//!     fn emit(&self, _elapsed: Duration, message: &str) {
//!         self.0.lock().unwrap().push(message.to_string());
//!     }
//! }
//!
//! let sink = Arc::new(Collect::default());
//! let ctx = RunContext::new().with_sink(sink.clone());
//! ctx.log("Plan generated successfully");
//! assert_eq!(sink.0.lock().unwrap().len(), 1);
//! ```

use crate::error::{GraphError, Result};
use crate::interrupt::InterruptRequest;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Destination for progress messages emitted during a run
pub trait ProgressSink: Send + Sync {
    fn emit(&self, elapsed: Duration, message: &str);
}

/// Forwards progress messages to `tracing` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, elapsed: Duration, message: &str) {
        tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", message);
    }
}

/// Explicit per-session context: start time and progress sink
#[derive(Clone)]
pub struct RunContext {
    started: Instant,
    sink: Arc<dyn ProgressSink>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Restart the elapsed-time clock.
    pub fn with_start(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.sink.emit(self.elapsed(), message.as_ref());
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Handle passed to every node invocation
///
/// Gives access to the run context, the identity of the execution, and the
/// [`interrupt`](Self::interrupt) primitive.
#[derive(Clone)]
pub struct NodeContext {
    node: String,
    thread_id: String,
    step: u64,
    run: RunContext,
    resume_values: Arc<Vec<Value>>,
    calls: Arc<AtomicUsize>,
}

impl NodeContext {
    pub(crate) fn new(
        node: impl Into<String>,
        thread_id: impl Into<String>,
        step: u64,
        run: RunContext,
        resume_values: Vec<Value>,
    ) -> Self {
        Self {
            node: node.into(),
            thread_id: thread_id.into(),
            step,
            run,
            resume_values: Arc::new(resume_values),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Steps completed on this thread before the current node
    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.run.log(message);
    }

    /// Suspend the run and surface `payload` to the caller.
    ///
    /// Returns the resume value when the node is re-entered after a resume;
    /// otherwise returns [`GraphError::Interrupt`], which the node must
    /// propagate.
    pub fn interrupt(&self, payload: Value) -> Result<Value> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.resume_values.get(index) {
            Some(value) => Ok(value.clone()),
            None => Err(GraphError::Interrupt(InterruptRequest::new(index, payload))),
        }
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("node", &self.node)
            .field("thread_id", &self.thread_id)
            .field("step", &self.step)
            .field("resume_values", &self.resume_values.len())
            .finish()
    }
}
