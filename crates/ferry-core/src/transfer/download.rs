//! Parallel chunk download into a positionally written destination.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{FerryError, Result};
use crate::remote::{JobStatus, ObjectStore, RemoteError};
use crate::retry::{run_with_retry, with_timeout, ChunkError};
use crate::runner::{BoundedRunner, ProgressCallback, TransferStats};
use crate::storage::PartFileBuilder;

use super::session::TransferSession;
use super::TransferOptions;

/// Result of a successful download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Final path of the reconstructed object.
    pub path: PathBuf,
    pub stats: TransferStats,
}

/// Pulls remote objects in parallel byte-range chunks.
///
/// Chunks land in `<destination>.part` at their own start offset, so the
/// result does not depend on completion order. The temp file is synced and
/// renamed onto `destination` only after every chunk succeeded; after a
/// failure it is left in place and the caller retries the whole transfer.
#[derive(Clone)]
pub struct ChunkedDownloader {
    store: Arc<dyn ObjectStore>,
}

async fn blocking<T, F>(context: &'static str, path: &Path, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            let io = std::io::Error::new(std::io::ErrorKind::Other, e);
            FerryError::fs(context, path, io)
        })?
        .map_err(|e| FerryError::fs(context, path, e))
}

impl ChunkedDownloader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Picks the `output_type` derivative child ending in `.extension` from a
    /// completed job's `status` and downloads it to `destination`.
    ///
    /// Fails with `NoDerivativeFound` before any chunk work when the listing
    /// has no such output or the store does not know the referenced object.
    pub async fn download_output(
        &self,
        status: &JobStatus,
        source_urn: &str,
        output_type: &str,
        extension: &str,
        destination: &Path,
        options: &TransferOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome> {
        let missing = || FerryError::NoDerivativeFound {
            source_urn: source_urn.to_string(),
            output_type: output_type.to_string(),
            extension: extension.to_string(),
        };
        let derivative_ref = status.output_ref(output_type, extension).ok_or_else(missing)?;

        match self
            .download(source_urn, derivative_ref, destination, options, on_progress)
            .await
        {
            Err(FerryError::Remote(RemoteError::NotFound(_))) => Err(missing()),
            other => other,
        }
    }

    /// Downloads `container`/`key` to `destination`.
    ///
    /// For conversion outputs `container` is the source URN and `key` the
    /// derivative reference.
    pub async fn download(
        &self,
        container: &str,
        key: &str,
        destination: &Path,
        options: &TransferOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DownloadOutcome> {
        let runner = BoundedRunner::new(options.max_concurrent)?.with_progress(on_progress);
        let meta = self.store.head_object(container, key).await?;
        let session = TransferSession::new(meta.size, options)?;

        let writer = {
            let owned = destination.to_path_buf();
            let size = meta.size;
            blocking("create temp file", destination, move || {
                let mut builder = PartFileBuilder::create(&owned)?;
                builder.preallocate(size)?;
                Ok(builder.build())
            })
            .await?
        };
        let part = writer.temp_path().to_path_buf();

        tracing::info!(
            store = self.store.name(),
            container,
            key,
            destination = %destination.display(),
            bytes = session.total_size(),
            chunks = session.chunk_count(),
            concurrency = runner.max_concurrent(),
            "starting chunked download"
        );

        let tasks: Vec<_> = session
            .ranges()
            .iter()
            .map(|range| {
                let range = *range;
                let store = Arc::clone(&self.store);
                let writer = writer.clone();
                let bytes_done = session.bytes_counter();
                let retry = options.retry;
                let timeout = options.chunk_timeout;
                let container = container.to_string();
                let key = key.to_string();
                async move {
                    let store = store.as_ref();
                    let (container, key) = (container.as_str(), key.as_str());
                    let data = run_with_retry(&retry, move || {
                        with_timeout(timeout, async move {
                            let data = store.get_chunk(container, key, &range).await?;
                            if data.len() as u64 != range.len() {
                                return Err(ChunkError::PartialTransfer {
                                    expected: range.len(),
                                    received: data.len() as u64,
                                });
                            }
                            Ok(data)
                        })
                    })
                    .await?;

                    tokio::task::spawn_blocking(move || writer.write_at(range.start, &data))
                        .await
                        .map_err(|e| ChunkError::Panicked(e.to_string()))?
                        .map_err(ChunkError::Storage)?;
                    bytes_done.fetch_add(range.len(), Ordering::Relaxed);
                    tracing::trace!(chunk = range.index, range = %range.descriptor(), "chunk written");
                    Ok::<_, ChunkError>(())
                }
            })
            .collect();

        let done = match runner.run(tasks).await {
            Ok(done) => done,
            Err(failure) => {
                tracing::warn!(
                    part = %part.display(),
                    chunk = failure.index,
                    "download failed; partial temp file left in place"
                );
                return Err(FerryError::from_chunk(failure.index, failure.error, &part));
            }
        };

        let path = blocking("finalize download", destination, move || writer.commit()).await?;

        let stats = session.stats(done.len());
        tracing::info!(
            destination = %destination.display(),
            bytes = stats.bytes_done,
            elapsed_secs = stats.elapsed_secs,
            "download complete"
        );
        Ok(DownloadOutcome { path, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::retry::RetryPolicy;
    use crate::storage::temp_path;
    use crate::testing::{fixtures, MemoryObjectStore};

    fn small_opts(chunk_size: u64, k: usize) -> TransferOptions {
        TransferOptions {
            chunk_size,
            max_concurrent: k,
            chunk_timeout: None,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reverse_completion_order_still_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let data = fixtures::payload(5_000);
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("urn", "out.obj", data.clone()).await;
        // Higher indexes finish first.
        store
            .set_chunk_delay(|i| Duration::from_millis(60u64.saturating_sub(i as u64 * 6)))
            .await;

        let dest = dir.path().join("alice").join("out.obj");
        let out = ChunkedDownloader::new(store.clone())
            .download("urn", "out.obj", &dest, &small_opts(512, 4), None)
            .await
            .unwrap();

        assert_eq!(out.path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert!(!temp_path(&dest).exists());
        assert_eq!(out.stats.chunk_count, 10);
        assert_eq!(out.stats.bytes_done, 5_000);
        assert!(store.max_in_flight() <= 4);
    }

    #[tokio::test]
    async fn transient_get_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("c", "k", b"abcdefgh".to_vec()).await;
        store
            .fail_next_gets(1, RemoteError::Connection("reset".into()))
            .await;

        let dest = dir.path().join("k");
        ChunkedDownloader::new(store.clone())
            .download("c", "k", &dest, &small_opts(3, 1), None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdefgh");
        assert_eq!(store.get_calls(), 4);
    }

    #[tokio::test]
    async fn failed_chunk_leaves_part_file_and_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("c", "k", fixtures::payload(100)).await;
        store.fail_chunk(2, RemoteError::Http(500)).await;

        let dest = dir.path().join("k");
        let err = ChunkedDownloader::new(store)
            .download("c", "k", &dest, &small_opts(10, 2), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::Transfer { index: 2, .. }));
        assert!(!dest.exists());
        assert!(temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn missing_output_type_fails_before_chunk_work() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let status = fixtures::complete_with("svf", &["model.svf"]);

        let err = ChunkedDownloader::new(store.clone())
            .download_output(
                &status,
                "urn",
                "obj",
                "obj",
                &dir.path().join("model.obj"),
                &small_opts(10, 2),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::NoDerivativeFound { .. }));
        assert_eq!(store.head_calls(), 0);
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_derivative_object_is_no_derivative_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let status = fixtures::complete_with("obj", &["urn:out/model.obj"]);

        let err = ChunkedDownloader::new(store.clone())
            .download_output(
                &status,
                "urn",
                "obj",
                "obj",
                &dir.path().join("model.obj"),
                &small_opts(10, 2),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FerryError::NoDerivativeFound { .. }));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn empty_object_produces_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store.put_object("c", "empty", Vec::new()).await;

        let dest = dir.path().join("empty");
        let out = ChunkedDownloader::new(store.clone())
            .download("c", "empty", &dest, &small_opts(10, 2), None)
            .await
            .unwrap();
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
        assert_eq!(out.stats.chunk_count, 0);
        assert_eq!(store.get_calls(), 0);
    }
}
