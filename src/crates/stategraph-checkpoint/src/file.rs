//! File-backed checkpoint storage
//!
//! Each thread gets a directory under the saver root, each checkpoint one
//! JSON file named after its zero-padded sequence number:
//!
//! ```text
//! <root>/
//!   session-1/
//!     00000000000000000000.json
//!     00000000000000000001.json
//!   session-1%2Fadvice_planning/
//!     00000000000000000000.json
//! ```
//!
//! Thread ids are percent-encoded so subordinate ids (`parent/child[2]`) map to
//! a single flat directory. Files are written to a temporary name and renamed,
//! so a reader never observes a half-written checkpoint.

use crate::{
    checkpoint::Checkpoint,
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const EXTENSION: &str = "json";

/// Checkpoint saver persisting JSON files on the local filesystem
#[derive(Debug, Clone)]
pub struct FileCheckpointSaver {
    root: PathBuf,
}

impl FileCheckpointSaver {
    /// Create a saver rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root.join(encode_thread_id(thread_id))
    }

    /// Sequence numbers stored for a thread, ascending
    async fn sequence_numbers(&self, thread_id: &str) -> Result<Vec<u64>> {
        let dir = self.thread_dir(thread_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut seqs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(seq) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn read_checkpoint(&self, thread_id: &str, seq: u64) -> Result<Checkpoint> {
        let path = self.thread_dir(thread_id).join(file_name(seq));
        let bytes = fs::read(&path).await?;
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        if checkpoint.thread_id != thread_id {
            return Err(CheckpointError::Invalid(format!(
                "{} belongs to thread '{}', expected '{}'",
                path.display(),
                checkpoint.thread_id,
                thread_id
            )));
        }
        Ok(checkpoint)
    }
}

#[async_trait]
impl CheckpointSaver for FileCheckpointSaver {
    async fn put(&self, checkpoint: Checkpoint) -> Result<()> {
        let dir = self.thread_dir(&checkpoint.thread_id);
        fs::create_dir_all(&dir).await?;

        let body = serde_json::to_vec_pretty(&checkpoint)?;
        let target = dir.join(file_name(checkpoint.seq));
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        match self.sequence_numbers(thread_id).await?.last() {
            Some(&seq) => Ok(Some(self.read_checkpoint(thread_id, seq).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let seqs = self.sequence_numbers(thread_id).await?;
        let mut results = Vec::new();
        for seq in seqs.into_iter().rev().take(limit.unwrap_or(usize::MAX)) {
            results.push(self.read_checkpoint(thread_id, seq).await);
        }
        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        match fs::remove_dir_all(self.thread_dir(thread_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn file_name(seq: u64) -> String {
    format!("{seq:020}.{EXTENSION}")
}

/// Percent-encode everything outside `[A-Za-z0-9_-]` so any thread id is a
/// single safe path component.
fn encode_thread_id(thread_id: &str) -> String {
    let mut encoded = String::with_capacity(thread_id.len());
    for byte in thread_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
