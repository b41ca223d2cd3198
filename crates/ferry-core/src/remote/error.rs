//! Errors returned by remote object store and conversion service calls.

use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Request did not complete in time.
    #[error("request timed out")]
    Timeout,
    /// Network-level failure (DNS, refused, reset).
    #[error("connection failed: {0}")]
    Connection(String),
    /// Non-success HTTP status.
    #[error("HTTP {0}")]
    Http(u16),
    /// Object or job does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}
