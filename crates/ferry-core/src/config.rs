//! Settings file at `$XDG_CONFIG_HOME/ferry/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::jobs::{PollerConfig, SubmitConfig};
use crate::planner::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CONCURRENT};
use crate::remote::ContainerPolicy;
use crate::retry::RetryPolicy;
use crate::transfer::TransferOptions;

/// Per-chunk retry parameters (optional `[retry]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

fn default_conversions_dir() -> PathBuf {
    PathBuf::from("conversions")
}

/// Transfer, container and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FerryConfig {
    /// Bytes per chunk for uploads and downloads.
    pub chunk_size_bytes: u64,
    /// Chunks in flight at once per transfer.
    pub max_concurrent_chunks: usize,
    /// Seconds between poll ticks.
    pub poll_interval_secs: u64,
    /// Container source files are uploaded into.
    pub container: String,
    /// Retention policy used when the container has to be created.
    #[serde(default)]
    pub container_policy: ContainerPolicy,
    /// Derivative type requested from the conversion service.
    pub output_type: String,
    /// Extension of the derivative child to download.
    pub output_extension: String,
    /// Root of the per-owner output directories.
    #[serde(default = "default_conversions_dir")]
    pub conversions_dir: PathBuf,
    /// Optional limit on a single chunk attempt, in seconds.
    #[serde(default)]
    pub chunk_timeout_secs: Option<u64>,
    /// Optional limit on a single status query, in seconds.
    #[serde(default)]
    pub status_timeout_secs: Option<u64>,
    /// Evict a job after this many failed downloads; unset retries forever.
    #[serde(default)]
    pub max_download_attempts: Option<u32>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for FerryConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: DEFAULT_MAX_CONCURRENT,
            poll_interval_secs: 15,
            container: "ferry-conversion".to_string(),
            container_policy: ContainerPolicy::Persistent,
            output_type: "obj".to_string(),
            output_extension: "obj".to_string(),
            conversions_dir: default_conversions_dir(),
            chunk_timeout_secs: None,
            status_timeout_secs: None,
            max_download_attempts: None,
            retry: None,
        }
    }
}

impl FerryConfig {
    /// Chunking, concurrency, timeout and retry settings for one transfer.
    /// Zero chunk size or concurrency is rejected when a transfer starts.
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size_bytes,
            max_concurrent: self.max_concurrent_chunks,
            chunk_timeout: self.chunk_timeout_secs.map(Duration::from_secs),
            retry: self
                .retry
                .as_ref()
                .map(RetryConfig::policy)
                .unwrap_or_default(),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            output_type: self.output_type.clone(),
            output_extension: self.output_extension.clone(),
            conversions_dir: self.conversions_dir.clone(),
            transfer: self.transfer_options(),
            status_timeout: self.status_timeout_secs.map(Duration::from_secs),
            max_download_attempts: self.max_download_attempts,
        }
    }

    pub fn submit_config(&self) -> SubmitConfig {
        SubmitConfig {
            container: self.container.clone(),
            container_policy: self.container_policy,
            output_type: self.output_type.clone(),
            output_extension: self.output_extension.clone(),
            transfer: self.transfer_options(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ferry")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FerryConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FerryConfig::default();
        write_default(&path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<FerryConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: FerryConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

fn write_default(path: &Path, cfg: &FerryConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("writing config {}", path.display()))?;
    Ok(())
}
