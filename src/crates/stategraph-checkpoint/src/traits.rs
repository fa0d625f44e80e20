//! Storage trait for checkpoint backends
//!
//! [`CheckpointSaver`] is the seam between the scheduler and whatever medium
//! holds checkpoints. The engine only ever calls [`CheckpointSaver::save`] (or
//! [`CheckpointSaver::put`]) after a step and [`CheckpointSaver::get_latest`]
//! before a run; listing and deletion exist for inspection and housekeeping.
//!
//! # Contract
//!
//! - Checkpoints are keyed by `(thread_id, seq)`. Putting a checkpoint whose
//!   key already exists replaces it; every other put appends.
//! - `get_latest` returns the entry with the highest `seq` for the thread.
//! - Writes for distinct thread ids must not interfere with each other. The
//!   fan-out coordinator writes from many subordinate threads concurrently.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use stategraph_checkpoint::{Checkpoint, CheckpointSaver, CheckpointStream, Result};
//!
//! struct RedisSaver { client: redis::Client }
//!
//! #[async_trait]
//! impl CheckpointSaver for RedisSaver {
//!     async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
//!         let key = format!("ckpt:{}:{:020}", checkpoint.thread_id, checkpoint.seq);
//!         let body = serde_json::to_string(&checkpoint)?;
//!         // SET key body
//!         Ok(())
//!     }
//!     // get_latest, list, delete_thread ...
//! }
//! ```

use crate::checkpoint::{Checkpoint, CheckpointMetadata, PendingInterrupt, Position};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Stream of checkpoints returned by [`CheckpointSaver::list`]
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send>>;

/// Pluggable checkpoint persistence
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Store a checkpoint, replacing any entry with the same thread and seq.
    async fn put(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Latest checkpoint of a thread, or `None` if the thread is unknown.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoints of a thread, newest first.
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream>;

    /// Remove every checkpoint of a thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Build and store the checkpoint following the thread's latest one.
    ///
    /// Convenience for callers that do not track sequence numbers themselves.
    async fn save(
        &self,
        thread_id: &str,
        position: Position,
        state: Value,
        interrupt: Option<PendingInterrupt>,
        metadata: CheckpointMetadata,
    ) -> Result<Checkpoint> {
        let seq = self
            .get_latest(thread_id)
            .await?
            .map(|latest| latest.next_seq())
            .unwrap_or(0);

        let mut checkpoint = Checkpoint::new(thread_id, seq, position, state, metadata);
        checkpoint.interrupt = interrupt;

        self.put(checkpoint.clone()).await?;
        Ok(checkpoint)
    }
}
