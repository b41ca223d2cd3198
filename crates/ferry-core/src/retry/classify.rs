//! Classify HTTP statuses, remote errors, and chunk errors into retry kinds.

use crate::remote::RemoteError;

use super::error::ChunkError;
use super::policy::ErrorKind;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a remote call failure.
pub fn classify_remote(e: &RemoteError) -> ErrorKind {
    match e {
        RemoteError::Timeout => ErrorKind::Timeout,
        RemoteError::Connection(_) => ErrorKind::Connection,
        RemoteError::Http(code) => classify_http_status(*code),
        RemoteError::NotFound(_) | RemoteError::Protocol(_) => ErrorKind::Other,
    }
}

/// Classify a chunk task error into an ErrorKind.
pub fn classify(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Remote(re) => classify_remote(re),
        ChunkError::PartialTransfer { .. } => ErrorKind::Connection,
        ChunkError::TimedOut(_) => ErrorKind::Timeout,
        ChunkError::Storage(_) | ChunkError::Panicked(_) => ErrorKind::Other,
    }
}
