//! Repository for the `jobs` table.
//!
//! Job mutations are computed in Rust by [`Job::apply`] and written back
//! whole with [`JobRepo::save`], so both store backends share one set of
//! update rules.

use radiarch_core::job_state::JobState;
use radiarch_core::types::{EntityId, Timestamp};
use sqlx::{FromRow, SqliteConnection};

use super::corrupt;
use crate::models::job::Job;
use crate::store::StoreError;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, plan_id, state, progress, message, stage, eta_seconds, \
    started_at, finished_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: EntityId,
    plan_id: EntityId,
    state: String,
    progress: f64,
    message: Option<String>,
    stage: Option<String>,
    eta_seconds: Option<f64>,
    started_at: Option<Timestamp>,
    finished_at: Option<Timestamp>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            plan_id: row.plan_id,
            state: row.state.parse().map_err(|e| corrupt("jobs", e))?,
            progress: row.progress,
            message: row.message,
            stage: row.stage,
            eta_seconds: row.eta_seconds,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

/// Provides persistence operations for plan jobs.
pub struct JobRepo;

impl JobRepo {
    pub async fn insert(conn: &mut SqliteConnection, job: &Job) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO jobs ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        );
        sqlx::query(&query)
            .bind(job.id)
            .bind(job.plan_id)
            .bind(job.state.as_str())
            .bind(job.progress)
            .bind(&job.message)
            .bind(&job.stage)
            .bind(job.eta_seconds)
            .bind(job.started_at)
            .bind(job.finished_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: EntityId,
    ) -> Result<Option<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .map(Job::try_from)
            .transpose()
    }

    /// Take the database write lock for a job row inside a transaction.
    ///
    /// Returns `false` if the job does not exist. Writing before reading
    /// keeps concurrent writers waiting on the busy timeout instead of
    /// failing a shared-to-exclusive lock upgrade.
    pub async fn lock(conn: &mut SqliteConnection, id: EntityId) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE jobs SET id = id WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write every mutable column of `job` back to its row.
    pub async fn save(conn: &mut SqliteConnection, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs \
             SET state = ?2, progress = ?3, message = ?4, stage = ?5, eta_seconds = ?6, \
                 started_at = ?7, finished_at = ?8 \
             WHERE id = ?1",
        )
        .bind(job.id)
        .bind(job.state.as_str())
        .bind(job.progress)
        .bind(&job.message)
        .bind(&job.stage)
        .bind(job.eta_seconds)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Up to `limit` queued jobs, oldest first.
    pub async fn list_queued(
        conn: &mut SqliteConnection,
        limit: i64,
    ) -> Result<Vec<Job>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE state = ?1 ORDER BY rowid LIMIT ?2");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(JobState::Queued.as_str())
            .bind(limit)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(Job::try_from)
            .collect()
    }
}
