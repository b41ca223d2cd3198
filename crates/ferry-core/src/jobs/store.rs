//! Optional durable mirror of the job registry (SQLite via sqlx).
//!
//! The registry works without a store; when one is attached every insert,
//! state change and removal is mirrored to it, and `JobRegistry::restore`
//! reloads outstanding jobs after a restart.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};

use super::types::{unix_timestamp, ConversionJob, JobState};

/// Persistence seam for outstanding jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace `job`.
    async fn save(&self, job: &ConversionJob) -> Result<()>;

    async fn delete(&self, job_id: &str) -> Result<()>;

    /// Every stored job, oldest first. `downloading` is always false.
    async fn load_all(&self) -> Result<Vec<ConversionJob>>;
}

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// `JobStore` in a SQLite database.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: Pool<Sqlite>,
}

impl SqliteJobStore {
    /// Open (or create) `$XDG_STATE_HOME/ferry/jobs.db`.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("ferry")?;
        let state_dir = xdg_dirs.get_state_home().join("ferry");
        Self::open_at(state_dir.join("jobs.db")).await
    }

    /// Open (or create) the database at `path`, creating parent dirs.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = SqliteJobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database, gone when the store is dropped.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteJobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversion_jobs (
                id TEXT PRIMARY KEY NOT NULL,
                owner_id TEXT NOT NULL,
                source_file_name TEXT NOT NULL,
                output_name TEXT NOT NULL,
                source_urn TEXT NOT NULL,
                submitted_at INTEGER NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn save(&self, job: &ConversionJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO conversion_jobs (
                id, owner_id, source_file_name, output_name, source_urn,
                submitted_at, state, attempts, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                attempts = excluded.attempts,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&job.id)
        .bind(&job.owner_id)
        .bind(&job.source_file_name)
        .bind(&job.output_name)
        .bind(&job.source_urn)
        .bind(job.submitted_at)
        .bind(job.state.as_str())
        .bind(job.attempts as i64)
        .bind(unix_timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM conversion_jobs WHERE id = ?1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ConversionJob>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, source_file_name, output_name, source_urn,
                   submitted_at, state, attempts
            FROM conversion_jobs
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let state: String = row.get("state");
            let state = state.parse().unwrap_or_else(|e| {
                tracing::warn!(job_id = %id, error = %e, "stored job has unknown state; treating as failed");
                JobState::Failed
            });
            let attempts: i64 = row.get("attempts");
            out.push(ConversionJob {
                id,
                owner_id: row.get("owner_id"),
                source_file_name: row.get("source_file_name"),
                output_name: row.get("output_name"),
                source_urn: row.get("source_urn"),
                submitted_at: row.get("submitted_at"),
                state,
                downloading: false,
                attempts: attempts.max(0) as u32,
            });
        }
        Ok(out)
    }
}
