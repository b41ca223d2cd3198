//! Chunk task error type for retry classification.

use std::fmt;
use std::time::Duration;

use crate::remote::RemoteError;

/// Error returned by a single chunk task (remote failure, short read, or
/// local storage failure). Classified before deciding whether to retry.
#[derive(Debug)]
pub enum ChunkError {
    /// Remote store rejected or failed the chunk operation.
    Remote(RemoteError),
    /// Fewer bytes arrived than the chunk covers (e.g. server closed early).
    /// Retried instead of being written as silent corruption.
    PartialTransfer { expected: u64, received: u64 },
    /// Local read or write failed (disk full, permission denied). Not retried.
    Storage(std::io::Error),
    /// A single attempt exceeded the configured per-chunk timeout.
    TimedOut(Duration),
    /// The chunk task panicked or was cancelled.
    Panicked(String),
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Remote(e) => write!(f, "{}", e),
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::TimedOut(d) => write!(f, "timed out after {:?}", d),
            ChunkError::Panicked(msg) => write!(f, "chunk task aborted: {}", msg),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Remote(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            ChunkError::PartialTransfer { .. }
            | ChunkError::TimedOut(_)
            | ChunkError::Panicked(_) => None,
        }
    }
}

impl From<RemoteError> for ChunkError {
    fn from(e: RemoteError) -> Self {
        ChunkError::Remote(e)
    }
}
