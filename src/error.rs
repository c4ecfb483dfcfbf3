//! Error types for GitMind

use thiserror::Error;

/// Engine error types
#[derive(Error, Debug)]
pub enum GitMindError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Command '{command}' failed with exit code {exit_code}: {stderr}")]
    ProcessFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Command '{0}' timed out")]
    ProcessTimeout(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid cache data: {0}")]
    CacheFormat(String),

    #[error("Cache version {found} does not match expected version {expected}")]
    CacheVersion { found: u32, expected: u32 },

    #[error("Status poll failed: {0}")]
    StatusFailed(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// External process failed, timed out or was cancelled
    Process,
    /// File system or watcher failure
    Io,
    /// Data could not be parsed or decoded
    Parse,
    /// Anything else, including library failures
    Unexpected,
}

impl GitMindError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GitMindError::ProcessFailed { .. }
            | GitMindError::ProcessTimeout(_)
            | GitMindError::Cancelled
            | GitMindError::StatusFailed(_) => ErrorKind::Process,
            GitMindError::Io(_)
            | GitMindError::Watcher(_)
            | GitMindError::InvalidPath(_)
            | GitMindError::RepositoryNotFound(_) => ErrorKind::Io,
            GitMindError::CacheFormat(_)
            | GitMindError::CacheVersion { .. }
            | GitMindError::Serialization(_) => ErrorKind::Parse,
            GitMindError::Git(_) | GitMindError::OperationFailed(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type alias for GitMind operations
pub type Result<T> = std::result::Result<T, GitMindError>;
