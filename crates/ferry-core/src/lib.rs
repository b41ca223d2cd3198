//! Chunked transfer engine and conversion job tracker.
//!
//! Files move to and from a remote object store as parallel byte-range
//! chunks (`transfer`), conversions are submitted and tracked in a
//! `jobs::JobRegistry`, and a `jobs::JobPoller` downloads each finished
//! output exactly once.

pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod planner;
pub mod remote;
pub mod retry;
pub mod runner;
pub mod storage;
pub mod testing;
pub mod transfer;

pub use error::{FerryError, Result};
