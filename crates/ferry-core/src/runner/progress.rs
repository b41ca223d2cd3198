//! Per-transfer progress reporting.
//!
//! The runner reports a running percentage after every completed task;
//! transfers also return byte-level statistics once they settle.

use std::sync::Arc;

use crate::planner::ChunkBitmap;

/// Progress event delivered once per completed chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProgress {
    /// Percent of chunks completed, in `[0, 100]`, two decimal places.
    pub progress: f64,
    /// Index of the chunk that just completed.
    pub chunk_index: usize,
}

/// Callback invoked with each progress event, in completion order.
pub type ProgressCallback = Arc<dyn Fn(ChunkProgress) + Send + Sync>;

/// Running percentage of completed tasks. Values never decrease and reach
/// exactly 100.00 when the last task completes.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: usize,
    done: ChunkBitmap,
}

impl ProgressTracker {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            done: ChunkBitmap::new(total),
        }
    }

    /// Marks `index` completed and returns the new percentage.
    pub(crate) fn complete(&mut self, index: usize) -> f64 {
        self.done.set_completed(index);
        percent(self.done.completed_count(), self.total)
    }

    pub(crate) fn completed(&self) -> usize {
        self.done.completed_count()
    }

    pub(crate) fn all_completed(&self) -> bool {
        self.done.all_completed(self.total)
    }
}

/// `100 * completed / total`, rounded to two decimal places.
pub(crate) fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let raw = completed as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}

/// Snapshot of a settled transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferStats {
    /// Bytes moved by completed chunks.
    pub bytes_done: u64,
    /// Total object size in bytes.
    pub total_bytes: u64,
    /// Wall-clock duration of the chunk phase (seconds).
    pub elapsed_secs: f64,
    /// Number of chunks completed.
    pub chunks_done: usize,
    /// Total number of chunks in the plan.
    pub chunk_count: usize,
}

impl TransferStats {
    /// Transfer rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_chunks_end_at_exactly_100() {
        let mut t = ProgressTracker::new(7);
        let mut last = 0.0;
        for i in [3, 0, 6, 1, 5, 2, 4] {
            let p = t.complete(i);
            assert!(p >= last, "progress must not decrease");
            last = p;
        }
        assert_eq!(last, 100.0);
        assert!(t.all_completed());
    }

    #[test]
    fn percent_rounds_to_two_places() {
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(2, 3), 66.67);
        assert_eq!(percent(1, 7), 14.29);
        assert_eq!(percent(0, 5), 0.0);
    }

    #[test]
    fn duplicate_completion_does_not_advance() {
        let mut t = ProgressTracker::new(4);
        assert_eq!(t.complete(1), 25.0);
        assert_eq!(t.complete(1), 25.0);
        assert_eq!(t.completed(), 1);
    }

    #[test]
    fn stats_rate_and_fraction() {
        let s = TransferStats {
            bytes_done: 500,
            total_bytes: 1000,
            elapsed_secs: 2.0,
            chunks_done: 1,
            chunk_count: 2,
        };
        assert_eq!(s.bytes_per_sec(), 250.0);
        assert_eq!(s.fraction(), 0.5);
        let empty = TransferStats {
            bytes_done: 0,
            total_bytes: 0,
            elapsed_secs: 0.0,
            chunks_done: 0,
            chunk_count: 0,
        };
        assert_eq!(empty.bytes_per_sec(), 0.0);
        assert_eq!(empty.fraction(), 1.0);
    }
}
