//! Error types shared across Syndicate crates.

use thiserror::Error;

/// Workspace-wide result alias.
pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Debug, Error)]
pub enum SyndicateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// Registration input rejected (missing name, missing handler, ...).
    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

impl SyndicateError {
    /// True for a missing file or directory, which loaders treat as "empty".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
