//! Scripted conversion service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::remote::{JobStatus, RemoteError, TranslationService};

/// A recorded job submission for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub job_id: String,
    pub source_urn: String,
    pub output_type: String,
}

/// `TranslationService` answering from per-job scripts.
///
/// Each job has a queue of status answers. A status query pops the front of
/// the queue while more than one entry remains; the last entry repeats.
#[derive(Debug, Default)]
pub struct MemoryTranslationService {
    scripts: RwLock<HashMap<String, VecDeque<Result<JobStatus, RemoteError>>>>,
    submissions: RwLock<Vec<RecordedSubmission>>,
    next_submit_error: RwLock<Option<RemoteError>>,
    status_delay: RwLock<Option<Duration>>,
    next_id: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MemoryTranslationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the status answers for `job_id`.
    pub async fn script_status(&self, job_id: &str, statuses: Vec<JobStatus>) {
        self.script_results(job_id, statuses.into_iter().map(Ok).collect())
            .await;
    }

    /// Like `script_status`, with query failures mixed in.
    pub async fn script_results(&self, job_id: &str, results: Vec<Result<JobStatus, RemoteError>>) {
        self.scripts
            .write()
            .await
            .insert(job_id.to_string(), results.into());
    }

    /// Append one answer to `job_id`'s script.
    pub async fn push_status(&self, job_id: &str, status: JobStatus) {
        self.scripts
            .write()
            .await
            .entry(job_id.to_string())
            .or_default()
            .push_back(Ok(status));
    }

    /// Fail the next submission with `error`.
    pub async fn set_next_submit_error(&self, error: RemoteError) {
        *self.next_submit_error.write().await = Some(error);
    }

    /// Sleep this long inside every status query.
    pub async fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.write().await = Some(delay);
    }

    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.submissions.read().await.clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationService for MemoryTranslationService {
    async fn submit_job(&self, source_urn: &str, output_type: &str) -> Result<String, RemoteError> {
        if let Some(err) = self.next_submit_error.write().await.take() {
            return Err(err);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("job-{}", n);
        self.submissions.write().await.push(RecordedSubmission {
            job_id: job_id.clone(),
            source_urn: source_urn.to_string(),
            output_type: output_type.to_string(),
        });
        Ok(job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<JobStatus, RemoteError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.read().await;
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut scripts = self.scripts.write().await;
        let queue = scripts
            .get_mut(job_id)
            .ok_or_else(|| RemoteError::NotFound(job_id.to_string()))?;
        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(RemoteError::NotFound(job_id.to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(RemoteError::NotFound(job_id.to_string())))
        }
    }
}
