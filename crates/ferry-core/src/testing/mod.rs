//! In-memory implementations of the remote traits for tests.
//!
//! ```rust,ignore
//! use ferry_core::testing::{MemoryObjectStore, MemoryTranslationService};
//!
//! let store = MemoryObjectStore::new();
//! store.set_chunk_delay(|index| Duration::from_millis(50 * (3 - index as u64))).await;
//!
//! let service = MemoryTranslationService::new();
//! service.script_status("job-1", vec![JobStatus::with_progress(JobProgress::Pending)]).await;
//! ```

mod object_store;
mod translation;

pub use object_store::MemoryObjectStore;
pub use translation::{MemoryTranslationService, RecordedSubmission};

/// Status fixtures.
pub mod fixtures {
    use crate::remote::{Derivative, DerivativeChild, JobProgress, JobStatus};

    /// Complete status with one derivative of `output_type` holding `children`.
    pub fn complete_with(output_type: &str, children: &[&str]) -> JobStatus {
        JobStatus {
            progress: JobProgress::Complete,
            derivatives: vec![Derivative {
                output_type: output_type.to_string(),
                children: children
                    .iter()
                    .map(|r| DerivativeChild {
                        reference: r.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    pub fn pending() -> JobStatus {
        JobStatus::with_progress(JobProgress::Pending)
    }

    pub fn failed() -> JobStatus {
        JobStatus::with_progress(JobProgress::Failed)
    }

    /// Deterministic non-repeating test payload of `len` bytes.
    pub fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 ^ (i / 251) as u8).collect()
    }
}
