//! Durable key→status map for media jobs.
//!
//! [`StatusStore`] is the raw string map the orchestrator depends on;
//! [`StatusRepo`] layers the typed `"media:" + fingerprint` / [`JobStatus`]
//! vocabulary on top of it. Two backends ship with the crate: an in-memory
//! map for tests and single-process use, and a JSON file backend that
//! survives restarts.

pub mod backends;
pub mod repo;

use async_trait::async_trait;

pub use backends::file::FileStatusStore;
pub use backends::memory::MemoryStatusStore;
pub use repo::StatusRepo;

/// Errors raised by status store backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Status store unavailable: {0}")]
    Unavailable(String),

    #[error("Status store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Status store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<StoreError> for mediaflow_core::error::CoreError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// A durable string→string map.
///
/// Implementations must be safe to share across tasks. No compare-and-swap
/// is offered; callers that need an atomic check-then-set serialize it
/// themselves.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of every stored entry.
    async fn entries(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Cheap liveness probe used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
