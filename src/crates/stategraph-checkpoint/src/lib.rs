//! # stategraph-checkpoint
//!
//! Persistence layer for the stategraph engine: the checkpoint data model and
//! the [`CheckpointSaver`] trait, with an in-memory and a file-backed
//! implementation.
//!
//! A checkpoint records, for one thread, the position the scheduler continues
//! from, the full state, and the interrupt waiting for an answer. The engine
//! writes one after every step and reads the latest before every run.
//!
//! ```rust,ignore
//! use stategraph_checkpoint::{CheckpointSaver, InMemoryCheckpointSaver};
//!
//! let saver = InMemoryCheckpointSaver::new();
//! if let Some(latest) = saver.get_latest("session-1").await? {
//!     println!("thread is at {:?}", latest.position);
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

// Re-export main types
pub use checkpoint::{
    Branch, Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, PendingInterrupt,
    Position,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
