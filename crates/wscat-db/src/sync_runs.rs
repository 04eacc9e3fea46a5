//! Database operations for `sync_runs`.
//!
//! Runs are append-only: a row is created `running` and moved to exactly one
//! terminal status. Transitions are guarded on the current status so a
//! finished run can never be edited again.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use wscat_core::{SyncCounts, SyncRun, SyncRunStatus, SyncRunType, TriggerSource};

use crate::DbError;

const SYNC_RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, started_at, \
     completed_at, fetched_count, upserted_count, error_count, skipped_count, error_message, \
     created_at";

/// A row from the `sync_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub fetched_count: i32,
    pub upserted_count: i32,
    pub error_count: i32,
    pub skipped_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SyncRunRow> for SyncRun {
    type Error = DbError;

    fn try_from(row: SyncRunRow) -> Result<Self, Self::Error> {
        let decode = |e: wscat_core::UnknownVariant| DbError::Decode(e.to_string());
        Ok(Self {
            id: row.id,
            public_id: row.public_id,
            run_type: row.run_type.parse().map_err(decode)?,
            trigger_source: row.trigger_source.parse().map_err(decode)?,
            status: row.status.parse().map_err(decode)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            fetched_count: row.fetched_count,
            upserted_count: row.upserted_count,
            error_count: row.error_count,
            skipped_count: row.skipped_count,
            error_message: row.error_message,
        })
    }
}

/// Creates a run in `running` status with `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_run(
    pool: &PgPool,
    run_type: SyncRunType,
    trigger_source: TriggerSource,
) -> Result<SyncRun, DbError> {
    let row = sqlx::query_as::<_, SyncRunRow>(&format!(
        "INSERT INTO sync_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'running') \
         RETURNING {SYNC_RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(run_type.as_str())
    .bind(trigger_source.as_str())
    .fetch_one(pool)
    .await?;

    SyncRun::try_from(row)
}

/// Moves a `running` run to a terminal status, recording its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidSyncRunTransition`] if the run is not
/// `running` (or does not exist), or [`DbError::Sqlx`] if the update fails.
pub async fn finish_sync_run(
    pool: &PgPool,
    id: i64,
    status: SyncRunStatus,
    counts: SyncCounts,
    error_message: Option<&str>,
) -> Result<SyncRun, DbError> {
    let row = sqlx::query_as::<_, SyncRunRow>(&format!(
        "UPDATE sync_runs \
         SET status = $2, completed_at = NOW(), fetched_count = $3, upserted_count = $4, \
             error_count = $5, skipped_count = $6, error_message = $7 \
         WHERE id = $1 AND status = 'running' \
         RETURNING {SYNC_RUN_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(counts.fetched)
    .bind(counts.upserted)
    .bind(counts.errors)
    .bind(counts.skipped)
    .bind(error_message)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidSyncRunTransition {
        id,
        expected_status: "running",
    })?;

    SyncRun::try_from(row)
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_run(pool: &PgPool, id: i64) -> Result<SyncRun, DbError> {
    let row = sqlx::query_as::<_, SyncRunRow>(&format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    SyncRun::try_from(row)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_runs(pool: &PgPool, limit: i64) -> Result<Vec<SyncRun>, DbError> {
    let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SyncRun::try_from).collect()
}

/// The most recently started `success` run of any of `run_types`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn last_successful_run(
    pool: &PgPool,
    run_types: &[SyncRunType],
) -> Result<Option<SyncRun>, DbError> {
    let types: Vec<&str> = run_types.iter().map(|t| t.as_str()).collect();
    let row = sqlx::query_as::<_, SyncRunRow>(&format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs \
         WHERE status = 'success' AND run_type = ANY($1) \
         ORDER BY started_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(&types)
    .fetch_optional(pool)
    .await?;

    row.map(SyncRun::try_from).transpose()
}

/// Closes runs still `running` that started before `started_before` as
/// `failed` with `error_message`. Returns how many were closed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_runs(
    pool: &PgPool,
    started_before: DateTime<Utc>,
    error_message: &str,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE sync_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE status = 'running' AND started_at < $1",
    )
    .bind(started_before)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
