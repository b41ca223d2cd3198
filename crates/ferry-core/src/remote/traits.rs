//! Trait seams for the remote services the core talks to.

use async_trait::async_trait;

use crate::planner::ByteRange;

use super::error::RemoteError;
use super::types::{ChunkAck, ChunkUpload, ContainerPolicy, JobStatus, ObjectMeta};

/// Object store that accepts and returns objects only as byte-range chunks.
///
/// `container`/`key` address an uploaded object. Conversion outputs are
/// addressed with the encoded source URN as `container` and the derivative
/// reference as `key`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of this implementation (for logs).
    fn name(&self) -> &str;

    /// Make sure `container` exists, creating it with `policy` if missing.
    async fn ensure_container(
        &self,
        container: &str,
        policy: ContainerPolicy,
    ) -> Result<(), RemoteError>;

    /// Upload one chunk of a session. The store may answer with the final
    /// object id once the last missing chunk arrives.
    async fn put_chunk(&self, chunk: &ChunkUpload) -> Result<ChunkAck, RemoteError>;

    /// Authoritative metadata (size) of an object or derivative.
    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMeta, RemoteError>;

    /// Fetch exactly the bytes of `range`.
    async fn get_chunk(
        &self,
        container: &str,
        key: &str,
        range: &ByteRange,
    ) -> Result<Vec<u8>, RemoteError>;
}

/// Remote conversion service that runs jobs asynchronously.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Submit a conversion of the object identified by `source_urn`; returns the job id.
    async fn submit_job(&self, source_urn: &str, output_type: &str) -> Result<String, RemoteError>;

    /// Current status and derivative listing of a job.
    async fn get_status(&self, job_id: &str) -> Result<JobStatus, RemoteError>;
}
