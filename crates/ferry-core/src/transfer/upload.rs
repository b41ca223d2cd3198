//! Parallel chunk upload of a local file.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{FerryError, Result};
use crate::remote::{ChunkAck, ChunkUpload, ObjectRef, ObjectStore};
use crate::retry::{run_with_retry, with_timeout, ChunkError};
use crate::runner::{BoundedRunner, ProgressCallback, TransferStats};
use crate::storage::ChunkReader;

use super::session::TransferSession;
use super::TransferOptions;

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub object: ObjectRef,
    pub stats: TransferStats,
}

/// Pushes local files to an `ObjectStore` in parallel byte-range chunks.
#[derive(Clone)]
pub struct ChunkedUploader {
    store: Arc<dyn ObjectStore>,
}

impl ChunkedUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Uploads `file_path` as `container`/`key`.
    ///
    /// Succeeds only once every chunk has been acknowledged. The returned
    /// reference carries the store's object id when the completing chunk's
    /// acknowledgment includes one, otherwise one built from container and key.
    pub async fn upload(
        &self,
        file_path: &Path,
        key: &str,
        container: &str,
        options: &TransferOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadOutcome> {
        let runner = BoundedRunner::new(options.max_concurrent)?.with_progress(on_progress);
        let reader = {
            let path = file_path.to_path_buf();
            tokio::task::spawn_blocking(move || ChunkReader::open(&path))
                .await
                .map_err(|e| {
                    let io = std::io::Error::new(std::io::ErrorKind::Other, e);
                    FerryError::fs("open upload source", file_path, io)
                })?
                .map_err(|e| FerryError::fs("open upload source", file_path, e))?
        };
        let session = TransferSession::new(reader.len(), options)?;

        tracing::info!(
            store = self.store.name(),
            file = %file_path.display(),
            container,
            key,
            session = session.id(),
            bytes = session.total_size(),
            chunks = session.chunk_count(),
            concurrency = runner.max_concurrent(),
            "starting chunked upload"
        );

        let tasks: Vec<_> = session
            .ranges()
            .iter()
            .map(|range| {
                let range = *range;
                let store = Arc::clone(&self.store);
                let reader = reader.clone();
                let bytes_done = session.bytes_counter();
                let retry = options.retry;
                let timeout = options.chunk_timeout;
                let container = container.to_string();
                let key = key.to_string();
                let session_id = session.id().to_string();
                let total_size = session.total_size();
                async move {
                    let data = tokio::task::spawn_blocking(move || {
                        reader.read_at(range.start, range.len())
                    })
                    .await
                    .map_err(|e| ChunkError::Panicked(e.to_string()))?
                    .map_err(ChunkError::Storage)?;

                    let chunk = ChunkUpload {
                        container,
                        key,
                        session_id,
                        range,
                        total_size,
                        data,
                    };
                    let store = store.as_ref();
                    let chunk_ref = &chunk;
                    let ack = run_with_retry(&retry, move || {
                        with_timeout(timeout, async move {
                            store.put_chunk(chunk_ref).await.map_err(ChunkError::from)
                        })
                    })
                    .await?;
                    bytes_done.fetch_add(range.len(), Ordering::Relaxed);
                    tracing::trace!(chunk = range.index, range = %range.descriptor(), "chunk acknowledged");
                    Ok::<_, ChunkError>(ack)
                }
            })
            .collect();

        let acks = runner
            .run(tasks)
            .await
            .map_err(|failure| FerryError::from_chunk(failure.index, failure.error, file_path))?;

        if acks.len() != session.chunk_count() {
            return Err(FerryError::IncompleteUpload {
                acknowledged: acks.len(),
                expected: session.chunk_count(),
            });
        }

        let object = match acks.values().find_map(|ack| match ack {
            ChunkAck::Stored { object_id } => Some(object_id.clone()),
            ChunkAck::Accepted => None,
        }) {
            Some(object_id) => ObjectRef {
                container: container.to_string(),
                key: key.to_string(),
                object_id,
            },
            None => ObjectRef::synthesized(container, key),
        };

        let stats = session.stats(acks.len());
        tracing::info!(
            session = session.id(),
            object_id = %object.object_id,
            bytes = stats.bytes_done,
            elapsed_secs = stats.elapsed_secs,
            "upload complete"
        );
        Ok(UploadOutcome { object, stats })
    }
}
