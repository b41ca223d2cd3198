//! Conversion job tracking: registry, optional persistence, submission
//! path and the status poller.

mod poller;
mod registry;
mod store;
mod submit;
mod types;

pub use poller::{JobPoller, PollerConfig, TickReport};
pub use registry::JobRegistry;
pub use store::{JobStore, SqliteJobStore};
pub use submit::{SubmitConfig, Submitter};
pub use types::{output_name_for, ConversionJob, JobId, JobState, UnknownJobState};
