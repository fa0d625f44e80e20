//! In-memory checkpoint storage
//!
//! Keeps every thread's lineage in a `BTreeMap` keyed by sequence number
//! behind a `tokio` read/write lock. Nothing survives the process; use
//! [`FileCheckpointSaver`](crate::FileCheckpointSaver) for that.

use crate::{
    checkpoint::Checkpoint,
    error::Result,
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type CheckpointStorage = Arc<RwLock<HashMap<String, BTreeMap<u64, Checkpoint>>>>;

/// Thread-safe in-memory checkpoint saver
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of stored checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Ids of every known thread, sorted
    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.storage.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .insert(checkpoint.seq, checkpoint);
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.values().next_back())
            .cloned())
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let results: Vec<Result<Checkpoint>> = storage
            .get(thread_id)
            .map(|entries| {
                entries
                    .values()
                    .rev()
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.storage.write().await.remove(thread_id);
        Ok(())
    }
}
