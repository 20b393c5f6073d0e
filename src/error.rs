//! Error types for the memory core.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// The error kinds a caller of the memory engine can observe.
///
/// `Conflict` is special: the contradiction scan surfaces it as structured
/// data from `remember`, not as a propagated error, but it is still modeled
/// here so storage-level conflict checks have a uniform type to report.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("embed error: {0}")]
    EmbedError(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Whether the engine should consider this kind retryable. The engine
    /// itself never retries automatically (per spec) but callers/transports
    /// may use this to decide.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MemoryError::Transient(_))
    }

    /// JSON-RPC error code for the MCP transport.
    pub fn code(&self) -> i64 {
        match self {
            MemoryError::NotFound(_) => -32001,
            MemoryError::Validation(_) => -32602,
            MemoryError::Conflict(_) => -32005,
            MemoryError::StorageError(_) | MemoryError::Database(_) | MemoryError::Io(_) => -32000,
            MemoryError::EmbedError(_) => -32010,
            MemoryError::Transient(_) => -32011,
            MemoryError::Serialization(_) => -32602,
        }
    }
}
