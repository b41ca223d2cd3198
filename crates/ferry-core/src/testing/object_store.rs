//! In-memory chunk-addressed object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::planner::ByteRange;
use crate::remote::{
    ChunkAck, ChunkUpload, ContainerPolicy, ObjectMeta, ObjectStore, RemoteError,
};

type DelayFn = Arc<dyn Fn(usize) -> Duration + Send + Sync>;

/// Chunks received so far for one upload session.
#[derive(Debug)]
struct SessionBuffer {
    container: String,
    key: String,
    total_size: u64,
    /// start offset -> bytes
    parts: BTreeMap<u64, Vec<u8>>,
}

impl SessionBuffer {
    fn received(&self) -> u64 {
        self.parts.values().map(|p| p.len() as u64).sum()
    }

    fn assemble(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.total_size as usize];
        for (start, bytes) in &self.parts {
            let start = *start as usize;
            out[start..start + bytes.len()].copy_from_slice(bytes);
        }
        out
    }
}

/// Pending injected failures.
#[derive(Debug, Default)]
struct Failures {
    next_puts: Option<(u32, RemoteError)>,
    next_gets: Option<(u32, RemoteError)>,
    /// Chunk index -> error returned on every put/get of that chunk.
    chunks: HashMap<usize, RemoteError>,
}

fn take_one(slot: &mut Option<(u32, RemoteError)>) -> Option<RemoteError> {
    let (left, err) = slot.as_mut()?;
    let err = err.clone();
    *left -= 1;
    if *left == 0 {
        *slot = None;
    }
    Some(err)
}

/// `ObjectStore` kept entirely in memory.
///
/// Uploads are buffered per session id and committed once every byte of
/// the object has arrived; the chunk that completes the object is answered
/// with `ChunkAck::Stored`. Per-chunk delays, failure injection and an
/// in-flight gauge let tests reorder completions and observe concurrency.
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
    containers: RwLock<HashMap<String, ContainerPolicy>>,
    sessions: RwLock<HashMap<String, SessionBuffer>>,
    echo_object_ids: RwLock<bool>,
    delay: RwLock<Option<DelayFn>>,
    failures: RwLock<Failures>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
    head_calls: AtomicUsize,
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore")
            .field("put_calls", &self.put_calls())
            .field("get_calls", &self.get_calls())
            .field("max_in_flight", &self.max_in_flight())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight gauge when a chunk call ends.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            containers: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            echo_object_ids: RwLock::new(true),
            delay: RwLock::new(None),
            failures: RwLock::new(Failures::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            head_calls: AtomicUsize::new(0),
        }
    }

    /// Object id the store reports for a committed object.
    pub fn object_id_for(container: &str, key: &str) -> String {
        format!("mem:{}/{}", container, key)
    }

    /// Store `data` directly, e.g. to stage a conversion output.
    pub async fn put_object(&self, container: &str, key: &str, data: Vec<u8>) {
        self.objects
            .write()
            .await
            .insert((container.to_string(), key.to_string()), data);
    }

    /// Committed bytes of an object.
    pub async fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// Containers created so far, with their policy.
    pub async fn containers(&self) -> HashMap<String, ContainerPolicy> {
        self.containers.read().await.clone()
    }

    /// When false, completing chunks are acknowledged with `Accepted` only.
    pub async fn set_echo_object_ids(&self, echo: bool) {
        *self.echo_object_ids.write().await = echo;
    }

    /// Sleep `delay(chunk_index)` inside every chunk call.
    pub async fn set_chunk_delay<F>(&self, delay: F)
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        *self.delay.write().await = Some(Arc::new(delay));
    }

    /// Fail the next `times` chunk uploads with `error`.
    pub async fn fail_next_puts(&self, times: u32, error: RemoteError) {
        self.failures.write().await.next_puts = (times > 0).then_some((times, error));
    }

    /// Fail the next `times` chunk reads with `error`.
    pub async fn fail_next_gets(&self, times: u32, error: RemoteError) {
        self.failures.write().await.next_gets = (times > 0).then_some((times, error));
    }

    /// Fail every upload or read of chunk `index` with `error`.
    pub async fn fail_chunk(&self, index: usize, error: RemoteError) {
        self.failures.write().await.chunks.insert(index, error);
    }

    /// Drop every injected failure.
    pub async fn clear_failures(&self) {
        *self.failures.write().await = Failures::default();
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    /// Highest number of chunk calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    async fn pause(&self, index: usize) {
        let delay = self.delay.read().await.clone();
        if let Some(delay) = delay {
            let d = delay(index);
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_container(
        &self,
        container: &str,
        policy: ContainerPolicy,
    ) -> Result<(), RemoteError> {
        self.containers
            .write()
            .await
            .entry(container.to_string())
            .or_insert(policy);
        Ok(())
    }

    async fn put_chunk(&self, chunk: &ChunkUpload) -> Result<ChunkAck, RemoteError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();
        self.pause(chunk.range.index).await;

        {
            let mut failures = self.failures.write().await;
            if let Some(err) = failures.chunks.get(&chunk.range.index) {
                return Err(err.clone());
            }
            if let Some(err) = take_one(&mut failures.next_puts) {
                return Err(err);
            }
        }

        if chunk.data.len() as u64 != chunk.range.len() {
            return Err(RemoteError::Protocol(format!(
                "chunk {} carries {} bytes for {}",
                chunk.range.index,
                chunk.data.len(),
                chunk.range.descriptor()
            )));
        }

        let completed = {
            let mut sessions = self.sessions.write().await;
            let buffer = sessions
                .entry(chunk.session_id.clone())
                .or_insert_with(|| SessionBuffer {
                    container: chunk.container.clone(),
                    key: chunk.key.clone(),
                    total_size: chunk.total_size,
                    parts: BTreeMap::new(),
                });
            buffer.parts.insert(chunk.range.start, chunk.data.clone());
            if buffer.received() >= buffer.total_size {
                sessions.remove(&chunk.session_id)
            } else {
                None
            }
        };

        let Some(buffer) = completed else {
            return Ok(ChunkAck::Accepted);
        };
        let data = buffer.assemble();
        self.put_object(&buffer.container, &buffer.key, data).await;
        if *self.echo_object_ids.read().await {
            Ok(ChunkAck::Stored {
                object_id: Self::object_id_for(&buffer.container, &buffer.key),
            })
        } else {
            Ok(ChunkAck::Accepted)
        }
    }

    async fn head_object(&self, container: &str, key: &str) -> Result<ObjectMeta, RemoteError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read().await;
        let data = objects
            .get(&(container.to_string(), key.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", container, key)))?;
        Ok(ObjectMeta {
            size: data.len() as u64,
            etag: None,
        })
    }

    async fn get_chunk(
        &self,
        container: &str,
        key: &str,
        range: &ByteRange,
    ) -> Result<Vec<u8>, RemoteError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter();
        self.pause(range.index).await;

        {
            let mut failures = self.failures.write().await;
            if let Some(err) = failures.chunks.get(&range.index) {
                return Err(err.clone());
            }
            if let Some(err) = take_one(&mut failures.next_gets) {
                return Err(err);
            }
        }

        let objects = self.objects.read().await;
        let data = objects
            .get(&(container.to_string(), key.to_string()))
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", container, key)))?;
        let start = range.start as usize;
        if start >= data.len() {
            return Err(RemoteError::Http(416));
        }
        let end = (range.end as usize).min(data.len() - 1);
        Ok(data[start..=end].to_vec())
    }
}
