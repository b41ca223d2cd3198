//! Conversion job records.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Job identifier assigned by the conversion service.
pub type JobId = String;

/// Tracker-side state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Registered; not polled yet.
    Submitted,
    /// Polled at least once and not finished remotely.
    Pending,
    /// Remote conversion finished; output download pending or in flight.
    Complete,
    /// Remote conversion or output retrieval failed for good.
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Pending => "pending",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }
}

/// A stored state string that names no `JobState`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state {0:?}")]
pub struct UnknownJobState(pub String);

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(JobState::Submitted),
            "pending" => Ok(JobState::Pending),
            "complete" => Ok(JobState::Complete),
            "failed" => Ok(JobState::Failed),
            other => Err(UnknownJobState(other.to_string())),
        }
    }
}

/// One outstanding conversion, from submission to output retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub id: JobId,
    pub owner_id: String,
    pub source_file_name: String,
    /// File name the converted output is saved under.
    pub output_name: String,
    /// Encoded URN of the uploaded source object.
    pub source_urn: String,
    /// Unix seconds.
    pub submitted_at: i64,
    pub state: JobState,
    /// A download for this job is in flight.
    pub downloading: bool,
    /// Download attempts started so far.
    pub attempts: u32,
}

impl ConversionJob {
    /// New job in `Submitted` state, output named after the source stem.
    pub fn new(
        id: impl Into<JobId>,
        owner_id: &str,
        source_file_name: &str,
        source_urn: &str,
        output_extension: &str,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.to_string(),
            source_file_name: source_file_name.to_string(),
            output_name: output_name_for(source_file_name, output_extension),
            source_urn: source_urn.to_string(),
            submitted_at: unix_timestamp(),
            state: JobState::Submitted,
            downloading: false,
            attempts: 0,
        }
    }

    /// `<conversions_dir>/<owner>/<output_name>`.
    pub fn output_path(&self, conversions_dir: &Path) -> PathBuf {
        conversions_dir.join(&self.owner_id).join(&self.output_name)
    }
}

/// `model.stp` + `obj` -> `model.obj`.
pub fn output_name_for(source_file_name: &str, extension: &str) -> String {
    let stem = Path::new(source_file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_file_name.to_string());
    format!("{}.{}", stem, extension)
}

pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
