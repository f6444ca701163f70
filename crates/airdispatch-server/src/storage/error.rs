//! Storage backend errors.

use thiserror::Error;

/// Failure reported by a [`Storage`](super::Storage) implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend itself failed (I/O, poisoned lock, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}
