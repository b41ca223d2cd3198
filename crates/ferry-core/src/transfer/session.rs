//! State owned by one transfer invocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::Result;
use crate::planner::{plan, ByteRange};
use crate::runner::TransferStats;

use super::TransferOptions;

/// Fresh opaque token correlating the chunks of one upload: 32 lowercase hex chars.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Plan, session id and byte counter of one upload or download.
///
/// Created at the start of a transfer and dropped when it settles.
#[derive(Debug)]
pub struct TransferSession {
    id: String,
    total_size: u64,
    chunk_size: u64,
    ranges: Vec<ByteRange>,
    bytes_done: Arc<AtomicU64>,
    started: Instant,
}

impl TransferSession {
    /// Plans `total_size` with the options' chunk size.
    pub fn new(total_size: u64, options: &TransferOptions) -> Result<Self> {
        let ranges = plan(total_size, options.chunk_size)?;
        Ok(Self {
            id: new_session_id(),
            total_size,
            chunk_size: options.chunk_size,
            ranges,
            bytes_done: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn chunk_count(&self) -> usize {
        self.ranges.len()
    }

    /// Shared counter chunk tasks add their byte count to.
    pub(crate) fn bytes_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_done)
    }

    pub fn stats(&self, chunks_done: usize) -> TransferStats {
        TransferStats {
            bytes_done: self.bytes_done.load(Ordering::Relaxed),
            total_bytes: self.total_size,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            chunks_done,
            chunk_count: self.ranges.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_fresh_hex() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn session_plans_with_chunk_size() {
        let opts = TransferOptions {
            chunk_size: 4,
            ..TransferOptions::default()
        };
        let s = TransferSession::new(10, &opts).unwrap();
        assert_eq!(s.chunk_count(), 3);
        assert_eq!(s.ranges()[2].start, 8);
        assert_eq!(s.stats(0).bytes_done, 0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let opts = TransferOptions {
            chunk_size: 0,
            ..TransferOptions::default()
        };
        assert!(TransferSession::new(10, &opts).is_err());
    }
}
