//! Error types for codex-mem

use thiserror::Error;

/// Result type alias for codex-mem operations
pub type Result<T> = std::result::Result<T, MemError>;

/// Main error type for codex-mem
#[derive(Error, Debug)]
pub enum MemError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Semantic index error: {0}")]
    Index(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MemError {
    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            MemError::InvalidInput(_) => 2,
            MemError::Config(_) => 3,
            _ => 1,
        }
    }
}
