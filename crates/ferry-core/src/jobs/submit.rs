//! Submission path: upload a source file, start its conversion, register the job.

use std::path::Path;
use std::sync::Arc;

use crate::error::{FerryError, Result};
use crate::remote::{ContainerPolicy, ObjectStore, TranslationService};
use crate::runner::ProgressCallback;
use crate::transfer::{ChunkedUploader, TransferOptions};

use super::registry::JobRegistry;
use super::types::ConversionJob;

/// Where sources go and what they are converted to.
#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub container: String,
    pub container_policy: ContainerPolicy,
    pub output_type: String,
    pub output_extension: String,
    pub transfer: TransferOptions,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            container: "ferry-conversion".to_string(),
            container_policy: ContainerPolicy::default(),
            output_type: "obj".to_string(),
            output_extension: "obj".to_string(),
            transfer: TransferOptions::default(),
        }
    }
}

/// Uploads sources and registers the resulting conversion jobs.
pub struct Submitter {
    store: Arc<dyn ObjectStore>,
    service: Arc<dyn TranslationService>,
    registry: Arc<JobRegistry>,
    uploader: ChunkedUploader,
    config: SubmitConfig,
}

impl Submitter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        service: Arc<dyn TranslationService>,
        registry: Arc<JobRegistry>,
        config: SubmitConfig,
    ) -> Self {
        let uploader = ChunkedUploader::new(Arc::clone(&store));
        Self {
            store,
            service,
            registry,
            uploader,
            config,
        }
    }

    /// Uploads `file` (keyed by its file name) for `owner_id`, submits the
    /// conversion and registers the job as `Submitted`. Returns the job.
    pub async fn submit(
        &self,
        file: &Path,
        owner_id: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ConversionJob> {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                let io = std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name");
                FerryError::fs("resolve source file name", file, io)
            })?;

        self.store
            .ensure_container(&self.config.container, self.config.container_policy)
            .await?;

        let upload = self
            .uploader
            .upload(
                file,
                &file_name,
                &self.config.container,
                &self.config.transfer,
                on_progress,
            )
            .await?;

        let source_urn = upload.object.urn();
        let job_id = self
            .service
            .submit_job(&source_urn, &self.config.output_type)
            .await?;

        let job = ConversionJob::new(
            job_id,
            owner_id,
            &file_name,
            &source_urn,
            &self.config.output_extension,
        );
        if !self.registry.insert(job.clone()).await {
            tracing::warn!(job_id = %job.id, "conversion service reused a registered job id");
        }
        tracing::info!(
            job_id = %job.id,
            owner = owner_id,
            object_id = %upload.object.object_id,
            output_type = %self.config.output_type,
            "conversion submitted"
        );
        Ok(job)
    }
}
