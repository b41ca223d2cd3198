//! Crate-wide error type.
//!
//! One variant per failure class a caller can act on differently: planning
//! input errors are fatal, "not ready" and "already downloading" are
//! expected transient branches of the poller, a missing derivative is
//! permanent for its job, and chunk failures end the transfer in progress.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::remote::RemoteError;
use crate::retry::ChunkError;

/// Errors surfaced by the transfer engine and job tracker.
#[derive(Debug, Error)]
pub enum FerryError {
    /// Chunk planning was asked for a non-positive chunk size.
    #[error("invalid chunk size {chunk_size}: must be at least 1 byte")]
    InvalidSize { chunk_size: u64 },

    /// Bounded runner was asked for zero concurrent tasks.
    #[error("invalid concurrency bound {max_concurrent}: must be at least 1")]
    InvalidConcurrency { max_concurrent: usize },

    /// Job status was queried before the remote conversion finished.
    #[error("job {job_id} not ready (status: {progress})")]
    NotReady { job_id: String, progress: String },

    /// A download for this job is already in flight.
    #[error("job {job_id} is already downloading")]
    AlreadyDownloading { job_id: String },

    /// Completed job has no output of the requested type/extension.
    #[error("no {output_type} derivative ending in .{extension} for {source_urn}")]
    NoDerivativeFound {
        source_urn: String,
        output_type: String,
        extension: String,
    },

    /// Remote service reported the conversion as failed.
    #[error("conversion failed remotely for job {job_id}")]
    TranslationFailed { job_id: String },

    /// First chunk that ultimately failed (after retries) in a transfer.
    #[error("chunk {index} failed: {source}")]
    Transfer {
        index: usize,
        #[source]
        source: ChunkError,
    },

    /// Upload settled without an acknowledgment for every chunk.
    #[error("upload incomplete: {acknowledged} of {expected} chunks acknowledged")]
    IncompleteUpload { acknowledged: usize, expected: usize },

    /// Local read/write failure.
    #[error("{context}: {}", path.display())]
    FileSystem {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-chunk remote call failed (metadata, submit, container bootstrap).
    #[error("remote request failed: {0}")]
    Remote(#[from] RemoteError),

    /// Job id is not present in the registry.
    #[error("job {job_id} is not registered")]
    UnknownJob { job_id: String },
}

impl FerryError {
    /// Wraps a local I/O error with what was being done and to which path.
    pub fn fs(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        FerryError::FileSystem {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Converts a runner failure into the transfer's terminal error.
    ///
    /// Local storage failures inside a chunk task are reported as
    /// `FileSystem`; everything else is a `Transfer` error for that chunk.
    pub fn from_chunk(index: usize, source: ChunkError, path: &Path) -> Self {
        match source {
            ChunkError::Storage(io) => FerryError::fs("chunk storage I/O failed", path, io),
            other => FerryError::Transfer {
                index,
                source: other,
            },
        }
    }

    /// True for outcomes the poller treats as permanent for a job.
    pub fn is_permanent_for_job(&self) -> bool {
        matches!(
            self,
            FerryError::NoDerivativeFound { .. } | FerryError::TranslationFailed { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T, E = FerryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_chunk_error_maps_to_filesystem() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = FerryError::from_chunk(2, ChunkError::Storage(io), Path::new("/tmp/x.part"));
        assert!(matches!(err, FerryError::FileSystem { .. }));
    }

    #[test]
    fn remote_chunk_error_maps_to_transfer() {
        let err = FerryError::from_chunk(
            4,
            ChunkError::Remote(RemoteError::Http(500)),
            Path::new("/tmp/x.part"),
        );
        match err {
            FerryError::Transfer { index, .. } => assert_eq!(index, 4),
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    #[test]
    fn permanent_errors() {
        let e = FerryError::NoDerivativeFound {
            source_urn: "abc".into(),
            output_type: "obj".into(),
            extension: "obj".into(),
        };
        assert!(e.is_permanent_for_job());
        let e = FerryError::AlreadyDownloading {
            job_id: "j".into(),
        };
        assert!(!e.is_permanent_for_job());
    }
}
