//! Periodic driver that polls job status and fetches finished outputs.
//!
//! Each tick works on a registry snapshot. Per job:
//! - not finished remotely: leave it (logged at debug only);
//! - failed remotely: evict with `TranslationFailed`;
//! - complete: claim the download via the registry's `downloading` flag
//!   (a job already downloading is skipped), pick the derivative, and run
//!   the download in the background. Success removes the job; failure
//!   releases the claim so the next tick tries again.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::{FerryError, Result};
use crate::remote::{JobProgress, JobStatus, ObjectStore, RemoteError, TranslationService};
use crate::runner::ProgressCallback;
use crate::transfer::{ChunkedDownloader, DownloadOutcome, TransferOptions};

use super::registry::JobRegistry;
use super::types::{ConversionJob, JobState};

/// Poller tuning and output selection.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    /// Derivative type to download.
    pub output_type: String,
    /// Extension the downloaded derivative child must have.
    pub output_extension: String,
    /// Outputs land in `<conversions_dir>/<owner>/<output_name>`.
    pub conversions_dir: PathBuf,
    pub transfer: TransferOptions,
    /// Limit on one status query; expiry leaves the job for the next tick.
    pub status_timeout: Option<Duration>,
    /// Evict a job after this many failed downloads. `None` retries forever.
    pub max_download_attempts: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            output_type: "obj".to_string(),
            output_extension: "obj".to_string(),
            conversions_dir: PathBuf::from("conversions"),
            transfer: TransferOptions::default(),
            status_timeout: None,
            max_download_attempts: None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs in the snapshot.
    pub polled: usize,
    pub not_ready: usize,
    pub downloads_started: usize,
    /// Complete jobs skipped because their download was still running.
    pub already_downloading: usize,
    /// Jobs removed for good (remote failure or missing output).
    pub evicted: Vec<String>,
    /// Status queries that failed or timed out.
    pub status_errors: usize,
}

struct PollerInner {
    registry: Arc<JobRegistry>,
    service: Arc<dyn TranslationService>,
    downloader: ChunkedDownloader,
    config: PollerConfig,
    on_progress: Option<ProgressCallback>,
    downloads: Mutex<JoinSet<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Drives outstanding jobs to completion. Cheap to clone.
#[derive(Clone)]
pub struct JobPoller {
    inner: Arc<PollerInner>,
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl JobPoller {
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ObjectStore>,
        service: Arc<dyn TranslationService>,
        config: PollerConfig,
    ) -> Self {
        Self::with_progress(registry, store, service, config, None)
    }

    /// Like `new`, reporting chunk progress of every download to `on_progress`.
    pub fn with_progress(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ObjectStore>,
        service: Arc<dyn TranslationService>,
        config: PollerConfig,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(PollerInner {
                registry,
                service,
                downloader: ChunkedDownloader::new(store),
                config,
                on_progress,
                downloads: Mutex::new(JoinSet::new()),
                shutdown_tx,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }

    /// Runs `tick` every `interval` until `stop` is called.
    pub fn spawn(&self) -> JoinHandle<()> {
        let poller = self.clone();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poller.inner.config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = poller.inner.config.interval.as_secs_f64(),
                "job poller started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("job poller received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        let report = poller.tick().await;
                        if report.polled > 0 {
                            tracing::debug!(?report, "poll tick finished");
                        }
                    }
                }
            }
        })
    }

    /// Signals a spawned loop to exit. Downloads already running continue;
    /// use `wait_for_downloads` to join them.
    pub fn stop(&self) {
        let _ = self.inner.shutdown_tx.send(());
    }

    /// One pass over every job registered at the start of the call.
    pub async fn tick(&self) -> TickReport {
        self.reap_finished().await;

        let jobs = self.inner.registry.snapshot().await;
        let mut report = TickReport {
            polled: jobs.len(),
            ..TickReport::default()
        };

        for job in jobs {
            let status = match self.query_status(&job.id).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "status query failed; will retry next tick");
                    report.status_errors += 1;
                    continue;
                }
            };

            match status.progress {
                JobProgress::Pending | JobProgress::InProgress => {
                    let not_ready = FerryError::NotReady {
                        job_id: job.id.clone(),
                        progress: status.progress.to_string(),
                    };
                    tracing::debug!(job_id = %job.id, "{}", not_ready);
                    if let Err(e) = self.inner.registry.set_state(&job.id, JobState::Pending).await {
                        tracing::debug!(job_id = %job.id, error = %e, "job removed while polling; skipping update");
                    }
                    report.not_ready += 1;
                }
                JobProgress::Failed => {
                    let err = FerryError::TranslationFailed {
                        job_id: job.id.clone(),
                    };
                    self.evict(&job, &err).await;
                    report.evicted.push(job.id.clone());
                }
                JobProgress::Complete => {
                    match self.start_download(&job, status).await {
                        Ok(()) => report.downloads_started += 1,
                        Err(FerryError::AlreadyDownloading { .. }) => {
                            tracing::debug!(job_id = %job.id, "download still in flight; skipping");
                            report.already_downloading += 1;
                        }
                        Err(FerryError::UnknownJob { .. }) => {}
                        Err(e) => {
                            // Only permanent outcomes come back from start_download.
                            self.evict(&job, &e).await;
                            report.evicted.push(job.id.clone());
                        }
                    }
                }
            }
        }

        report
    }

    /// Joins every background download started so far.
    pub async fn wait_for_downloads(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.inner.downloads.lock().await);
            if set.is_empty() {
                return;
            }
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "download task panicked");
                }
            }
        }
    }

    /// Number of background downloads not yet joined.
    pub async fn active_downloads(&self) -> usize {
        self.inner.downloads.lock().await.len()
    }

    /// Downloads the output of `job_id` now, in the caller's task.
    ///
    /// Queries the status first: not finished is `NotReady`, a remote failure
    /// evicts the job. Shares the registry's re-entrancy guard with the poller,
    /// so a job already downloading fails with `AlreadyDownloading` and starts
    /// no chunk work.
    pub async fn download_job(&self, job_id: &str) -> Result<DownloadOutcome> {
        let job = self
            .inner
            .registry
            .get(job_id)
            .await
            .ok_or_else(|| FerryError::UnknownJob {
                job_id: job_id.to_string(),
            })?;
        let status = self.query_status(job_id).await?;
        match status.progress {
            JobProgress::Complete => {}
            JobProgress::Failed => {
                let err = FerryError::TranslationFailed {
                    job_id: job_id.to_string(),
                };
                self.evict(&job, &err).await;
                return Err(err);
            }
            progress => {
                return Err(FerryError::NotReady {
                    job_id: job_id.to_string(),
                    progress: progress.to_string(),
                })
            }
        }

        let job = self.inner.registry.begin_download(job_id).await?;
        run_download(&self.inner, &job, &status).await
    }

    async fn query_status(&self, job_id: &str) -> Result<JobStatus> {
        let query = self.inner.service.get_status(job_id);
        let status = match self.inner.config.status_timeout {
            Some(limit) => tokio::time::timeout(limit, query)
                .await
                .map_err(|_| RemoteError::Timeout)??,
            None => query.await?,
        };
        Ok(status)
    }

    /// Claims the job and spawns its download. Returns `AlreadyDownloading`
    /// when claimed elsewhere and `NoDerivativeFound` when the listing lacks
    /// the configured output.
    async fn start_download(&self, job: &ConversionJob, status: JobStatus) -> Result<()> {
        let job = self.inner.registry.begin_download(&job.id).await?;
        let config = &self.inner.config;
        if status
            .output_ref(&config.output_type, &config.output_extension)
            .is_none()
        {
            return Err(FerryError::NoDerivativeFound {
                source_urn: job.source_urn.clone(),
                output_type: config.output_type.clone(),
                extension: config.output_extension.clone(),
            });
        }

        tracing::info!(job_id = %job.id, attempt = job.attempts, "conversion complete; downloading output");
        let inner = Arc::clone(&self.inner);
        self.inner.downloads.lock().await.spawn(async move {
            // Outcome is logged and settled in the registry by run_download.
            let _ = run_download(&inner, &job, &status).await;
        });
        Ok(())
    }

    async fn evict(&self, job: &ConversionJob, err: &FerryError) {
        evict(&self.inner, job, err).await;
    }

    async fn reap_finished(&self) {
        let mut set = self.inner.downloads.lock().await;
        while let Some(joined) = set.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "download task panicked");
            }
        }
    }
}

async fn evict(inner: &PollerInner, job: &ConversionJob, err: &FerryError) {
    // An UnknownJob here means the job is already gone; the remove below is then a no-op.
    if let Err(e) = inner.registry.set_state(&job.id, JobState::Failed).await {
        tracing::debug!(job_id = %job.id, error = %e, "job already removed before eviction");
    }
    inner.registry.remove(&job.id).await;
    tracing::error!(job_id = %job.id, owner = %job.owner_id, error = %err, "evicting job");
}

/// Downloads a claimed job's output and settles its registry entry.
async fn run_download(
    inner: &PollerInner,
    job: &ConversionJob,
    status: &JobStatus,
) -> Result<DownloadOutcome> {
    let config = &inner.config;
    let destination = job.output_path(&config.conversions_dir);
    let result = inner
        .downloader
        .download_output(
            status,
            &job.source_urn,
            &config.output_type,
            &config.output_extension,
            &destination,
            &config.transfer,
            inner.on_progress.clone(),
        )
        .await;

    match &result {
        Ok(outcome) => {
            inner.registry.remove(&job.id).await;
            tracing::info!(
                job_id = %job.id,
                path = %outcome.path.display(),
                bytes = outcome.stats.bytes_done,
                "output downloaded; job removed"
            );
        }
        Err(e) if e.is_permanent_for_job() => {
            evict(inner, job, e).await;
        }
        Err(e) => {
            let exhausted = config
                .max_download_attempts
                .is_some_and(|max| job.attempts >= max);
            if exhausted {
                tracing::error!(job_id = %job.id, attempts = job.attempts, error = %e, "download attempts exhausted");
                evict(inner, job, e).await;
            } else {
                tracing::error!(job_id = %job.id, attempt = job.attempts, error = %e, "download failed; will retry next tick");
                inner.registry.end_download(&job.id).await;
            }
        }
    }
    result
}
