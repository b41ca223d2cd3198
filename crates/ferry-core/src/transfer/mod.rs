//! Chunked transfer engine.
//!
//! Both directions plan the object into byte ranges, then run one task per
//! range on a `BoundedRunner`. Every chunk task retries on its own per the
//! `RetryPolicy`; only a chunk that exhausts its retries fails the transfer.

mod download;
mod session;
mod upload;

use std::time::Duration;

use crate::planner::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT};
use crate::retry::RetryPolicy;

pub use download::{ChunkedDownloader, DownloadOutcome};
pub use session::{new_session_id, TransferSession};
pub use upload::{ChunkedUploader, UploadOutcome};

/// Per-transfer tuning.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    /// Bytes per chunk (last chunk may be shorter).
    pub chunk_size: u64,
    /// Maximum chunks in flight at once.
    pub max_concurrent: usize,
    /// Limit on a single chunk attempt; expiry is retried like a network error.
    pub chunk_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            chunk_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}
