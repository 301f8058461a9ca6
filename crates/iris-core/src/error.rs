//! Error types for the Iris core.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the Iris core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Snapshot rejected: {0}")]
    Snapshot(String),

    #[error("Achievement store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("LLM bridge error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
