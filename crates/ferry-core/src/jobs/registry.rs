//! Lock-protected map of outstanding conversion jobs.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{FerryError, Result};

use super::store::JobStore;
use super::types::{ConversionJob, JobState};

/// Owner of every outstanding `ConversionJob`.
///
/// Each operation takes the lock once, so inserts from the submission path
/// never interleave with the poller's snapshot or its updates. Store writes
/// happen under the same lock, so the store sees changes in registry order.
/// Pollers work on snapshots (clones); the registry copy is authoritative.
///
/// Without a store, jobs live in memory only and are lost on restart.
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, ConversionJob>>,
    store: Option<Arc<dyn JobStore>>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

impl JobRegistry {
    /// In-memory registry.
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Registry mirrored to `store`.
    pub fn with_store(store: Arc<dyn JobStore>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Load stored jobs into memory; returns how many were added.
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let stored = store.load_all().await?;
        let mut jobs = self.jobs.lock().await;
        let mut added = 0;
        for mut job in stored {
            job.downloading = false;
            if !jobs.contains_key(&job.id) {
                jobs.insert(job.id.clone(), job);
                added += 1;
            }
        }
        tracing::info!(restored = added, "restored outstanding conversion jobs");
        Ok(added)
    }

    /// Adds `job`; returns false (and changes nothing) if its id is already present.
    pub async fn insert(&self, job: ConversionJob) -> bool {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return false;
        }
        tracing::debug!(job_id = %job.id, owner = %job.owner_id, "job registered");
        self.persist(&job).await;
        jobs.insert(job.id.clone(), job);
        true
    }

    /// Copies of all jobs, oldest submission first.
    pub async fn snapshot(&self) -> Vec<ConversionJob> {
        let mut out: Vec<_> = self.jobs.lock().await.values().cloned().collect();
        out.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub async fn get(&self, job_id: &str) -> Option<ConversionJob> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Sets the state of a job. Mirrors to the store only on change.
    pub async fn set_state(&self, job_id: &str, state: JobState) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| FerryError::UnknownJob {
            job_id: job_id.to_string(),
        })?;
        if job.state != state {
            job.state = state;
            self.persist(job).await;
        }
        Ok(())
    }

    /// Claims the download of a job: fails with `AlreadyDownloading` if one
    /// is in flight, otherwise sets `downloading` and counts the attempt.
    /// Returns the updated job.
    pub async fn begin_download(&self, job_id: &str) -> Result<ConversionJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| FerryError::UnknownJob {
            job_id: job_id.to_string(),
        })?;
        if job.downloading {
            return Err(FerryError::AlreadyDownloading {
                job_id: job_id.to_string(),
            });
        }
        job.downloading = true;
        job.state = JobState::Complete;
        job.attempts += 1;
        self.persist(job).await;
        Ok(job.clone())
    }

    /// Releases a claimed download so a later tick may retry it.
    pub async fn end_download(&self, job_id: &str) -> Option<ConversionJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(job_id)?;
        job.downloading = false;
        Some(job.clone())
    }

    /// Removes a job; returns it if it was present.
    pub async fn remove(&self, job_id: &str) -> Option<ConversionJob> {
        let mut jobs = self.jobs.lock().await;
        let removed = jobs.remove(job_id);
        if removed.is_some() {
            if let Some(store) = &self.store {
                if let Err(e) = store.delete(job_id).await {
                    tracing::warn!(job_id, error = %e, "failed to delete job from store");
                }
            }
        }
        removed
    }

    async fn persist(&self, job: &ConversionJob) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(job).await {
                tracing::warn!(job_id = %job.id, error = %e, "failed to persist job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::SqliteJobStore;

    fn job(id: &str) -> ConversionJob {
        ConversionJob::new(id, "alice", "model.stp", "dXJu", "obj")
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let reg = JobRegistry::new();
        assert!(reg.insert(job("a")).await);
        assert!(!reg.insert(job("a")).await);
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn second_download_claim_is_refused() {
        let reg = JobRegistry::new();
        reg.insert(job("a")).await;

        let claimed = reg.begin_download("a").await.unwrap();
        assert!(claimed.downloading);
        assert_eq!(claimed.attempts, 1);
        assert!(matches!(
            reg.begin_download("a").await,
            Err(FerryError::AlreadyDownloading { .. })
        ));

        reg.end_download("a").await;
        let again = reg.begin_download("a").await.unwrap();
        assert_eq!(again.attempts, 2);
    }

    #[tokio::test]
    async fn unknown_job_errors() {
        let reg = JobRegistry::new();
        assert!(matches!(
            reg.begin_download("nope").await,
            Err(FerryError::UnknownJob { .. })
        ));
        assert!(matches!(
            reg.set_state("nope", JobState::Pending).await,
            Err(FerryError::UnknownJob { .. })
        ));
        assert!(reg.remove("nope").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_inserts_are_not_lost() {
        let reg = Arc::new(JobRegistry::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                reg.insert(job(&format!("job-{i}"))).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(reg.snapshot().await.len(), 32);
    }

    #[tokio::test]
    async fn store_mirror_and_restore() {
        let store = Arc::new(SqliteJobStore::open_memory().await.unwrap());
        let reg = JobRegistry::with_store(store.clone());
        reg.insert(job("a")).await;
        reg.insert(job("b")).await;
        reg.set_state("a", JobState::Pending).await.unwrap();
        reg.begin_download("b").await.unwrap();
        reg.remove("a").await;

        let fresh = JobRegistry::with_store(store);
        assert_eq!(fresh.restore().await.unwrap(), 1);
        let b = fresh.get("b").await.unwrap();
        assert_eq!(b.attempts, 1);
        assert!(!b.downloading);
        assert!(fresh.get("a").await.is_none());
    }

    #[tokio::test]
    async fn restore_without_store_is_noop() {
        let reg = JobRegistry::new();
        assert_eq!(reg.restore().await.unwrap(), 0);
    }

    /// Store whose saves take a while to land.
    #[derive(Default)]
    struct SlowStore {
        rows: std::sync::Mutex<HashMap<String, ConversionJob>>,
    }

    #[async_trait::async_trait]
    impl JobStore for SlowStore {
        async fn save(&self, job: &ConversionJob) -> anyhow::Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.rows.lock().unwrap().insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn delete(&self, job_id: &str) -> anyhow::Result<()> {
            self.rows.lock().unwrap().remove(job_id);
            Ok(())
        }

        async fn load_all(&self) -> anyhow::Result<Vec<ConversionJob>> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[tokio::test]
    async fn removal_during_slow_save_is_not_undone() {
        let store = Arc::new(SlowStore::default());
        let reg = Arc::new(JobRegistry::with_store(store.clone()));

        let inserting = {
            let reg = Arc::clone(&reg);
            tokio::spawn(async move { reg.insert(job("a")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        reg.remove("a").await;
        assert!(inserting.await.unwrap());

        assert!(reg.is_empty().await);
        assert!(store.load_all().await.unwrap().is_empty(), "removed job must not come back");
        let fresh = JobRegistry::with_store(store);
        assert_eq!(fresh.restore().await.unwrap(), 0);
    }
}
