//! Per-chunk retry and backoff.
//!
//! Classifies chunk failures (timeouts, throttling, connection loss, storage
//! errors) and decides exponential backoff so the uploader and downloader
//! share one policy. A chunk is only reported to the runner as failed once
//! this layer gives up on it.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_http_status, classify_remote};
pub use error::ChunkError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, with_timeout};
