//! Error types for the wellbeing assistant

use llm::LlmError;
use stategraph_core::checkpoint::CheckpointError;
use stategraph_core::GraphError;
use thiserror::Error;

use crate::search::SearchError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Missing required environment variables: {0:?}")]
    MissingEnv(Vec<String>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Report a collaborator failure inside a node as a node failure, so the
/// thread can be retried from its last checkpoint.
pub fn node_failure(node: &str, error: impl std::fmt::Display) -> GraphError {
    GraphError::node_execution(node, error.to_string())
}
