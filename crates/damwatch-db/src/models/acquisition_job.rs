//! Acquisition job model.
//!
//! The durable system-of-record for historical data acquisition jobs.
//! Every state transition goes through the methods here; the fast queue
//! only carries wake-up hints and is never authoritative.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Maximum retry attempts across a job's lifetime.
pub const MAX_RETRIES: i32 = 3;

/// Maximum stored length of an error message, in characters.
pub const ERROR_MESSAGE_MAX_LEN: usize = 2000;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be picked up by the scheduler.
    Queued,
    /// A worker is executing the job.
    Processing,
    /// All windows collected successfully.
    Completed,
    /// Terminal failure (configuration error or retry budget exhausted).
    Failed,
    /// Interrupted by a retryable failure; eligible for requeue.
    Paused,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "paused" => Ok(JobStatus::Paused),
            _ => Err(format!("Unknown job status: {s}")),
        }
    }
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if the job counts against the one-active-job-per-instrument
    /// invariant.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Queued | JobStatus::Processing | JobStatus::Paused
        )
    }
}

/// A historical data acquisition job.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AcquisitionJob {
    /// Unique job identifier.
    pub id: Uuid,

    /// Instrument the job collects data for.
    pub instrument_id: Uuid,

    /// Instrument display name, denormalized for operator visibility.
    pub instrument_name: String,

    /// First date of the collection range (inclusive).
    pub start_date: NaiveDate,

    /// Last date of the collection range (inclusive).
    pub end_date: NaiveDate,

    /// Resume cursor: the last date durably accounted for.
    pub checkpoint_date: NaiveDate,

    /// Whole months between start and end date.
    pub total_months: i32,

    /// Whole months between start and checkpoint date.
    pub processed_months: i32,

    /// Readings created so far.
    pub created_readings: i32,

    /// Days skipped so far (already present, or no usable data).
    pub skipped_days: i32,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Retry attempts consumed (external errors and detected stalls).
    pub retry_count: i32,

    /// Last failure reason, truncated to [`ERROR_MESSAGE_MAX_LEN`].
    pub error_message: Option<String>,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,

    /// When the current (or last) processing run began.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new acquisition job.
#[derive(Debug, Clone)]
pub struct CreateAcquisitionJob {
    pub instrument_id: Uuid,
    pub instrument_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_months: i32,
}

impl AcquisitionJob {
    /// Create a new job with status `queued` and checkpoint at the start
    /// date.
    ///
    /// The partial unique index on active jobs makes this fail with a
    /// database error if another active job exists for the instrument.
    pub async fn create(pool: &PgPool, input: &CreateAcquisitionJob) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO acquisition_jobs (
                id, instrument_id, instrument_name,
                start_date, end_date, checkpoint_date, total_months
            )
            VALUES ($1, $2, $3, $4, $5, $4, $6)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(input.instrument_id)
        .bind(&input.instrument_name)
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.total_months)
        .fetch_one(pool)
        .await
    }

    /// Find a job by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM acquisition_jobs
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Check whether an active (queued, processing, or paused) job
    /// exists for an instrument.
    pub async fn exists_active_for_instrument(
        pool: &PgPool,
        instrument_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT EXISTS(
                SELECT 1 FROM acquisition_jobs
                WHERE instrument_id = $1
                    AND status IN ('queued', 'processing', 'paused')
            )
            ",
        )
        .bind(instrument_id)
        .fetch_one(pool)
        .await
    }

    /// Find the most recent job for an instrument, active or not.
    pub async fn find_latest_for_instrument(
        pool: &PgPool,
        instrument_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM acquisition_jobs
            WHERE instrument_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(instrument_id)
        .fetch_optional(pool)
        .await
    }

    /// List jobs with a given status, oldest first.
    pub async fn list_by_status(
        pool: &PgPool,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM acquisition_jobs
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            ",
        )
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// List the most recently created jobs, for operator inspection.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM acquisition_jobs
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// List processing jobs whose run started more than
    /// `threshold_secs` ago and which have shown no progress since.
    ///
    /// These are presumed abandoned by a dead worker.
    pub async fn list_stalled(
        pool: &PgPool,
        threshold_secs: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT * FROM acquisition_jobs
            WHERE status = 'processing'
                AND started_at IS NOT NULL
                AND started_at < NOW() - make_interval(secs => $1)
                AND updated_at < NOW() - make_interval(secs => $1)
            ORDER BY started_at ASC
            ",
        )
        .bind(threshold_secs as f64)
        .fetch_all(pool)
        .await
    }

    /// IDs of jobs that should be re-offered to the fast queue after a
    /// restart: everything queued, plus paused jobs with retry budget.
    pub async fn list_recoverable_ids(pool: &PgPool) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r"
            SELECT id FROM acquisition_jobs
            WHERE status = 'queued'
                OR (status = 'paused' AND retry_count < $1)
            ORDER BY created_at ASC
            ",
        )
        .bind(MAX_RETRIES)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Claim a queued job for processing (atomic `queued` -> `processing`
    /// transition, stamping the start time).
    ///
    /// Returns `None` if the job is missing or no longer queued, so a
    /// stale queue entry is observable as a no-op.
    pub async fn mark_processing(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            UPDATE acquisition_jobs
            SET status = 'processing', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            RETURNING *
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Advance the checkpoint and accumulate counters.
    ///
    /// The checkpoint never moves backwards and never leaves the job's
    /// date range; repeated delivery of the same progress update is
    /// harmless for the cursor (counters are deltas and assume
    /// at-least-once semantics upstream of the idempotent insert).
    ///
    /// Takes any executor so the service can run it inside the batch
    /// flush transaction.
    pub async fn update_progress<'e, E>(
        executor: E,
        id: Uuid,
        checkpoint_date: NaiveDate,
        created_delta: i32,
        skipped_delta: i32,
        processed_months: i32,
    ) -> Result<bool, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            UPDATE acquisition_jobs
            SET checkpoint_date = LEAST(end_date, GREATEST(checkpoint_date, $2)),
                processed_months = GREATEST(processed_months, $3),
                created_readings = created_readings + $4,
                skipped_days = skipped_days + $5,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(checkpoint_date)
        .bind(processed_months)
        .bind(created_delta)
        .bind(skipped_delta)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the job as completed.
    pub async fn mark_completed(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE acquisition_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the job as failed with a bounded-length reason.
    pub async fn mark_failed(pool: &PgPool, id: Uuid, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE acquisition_jobs
            SET status = 'failed', completed_at = NOW(), updated_at = NOW(),
                error_message = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(truncate_error(reason))
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark the job as paused with a bounded-length reason.
    pub async fn mark_paused(pool: &PgPool, id: Uuid, reason: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE acquisition_jobs
            SET status = 'paused', updated_at = NOW(), error_message = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(truncate_error(reason))
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip a paused job back to queued so the drain loop will pick it up.
    pub async fn requeue(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r"
            UPDATE acquisition_jobs
            SET status = 'queued', updated_at = NOW()
            WHERE id = $1 AND status = 'paused'
            ",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Increment the retry counter and return its new value, or `None` if
    /// the job does not exist.
    pub async fn increment_retry(pool: &PgPool, id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar(
            r"
            UPDATE acquisition_jobs
            SET retry_count = retry_count + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING retry_count
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Check whether this job still has retry budget.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < MAX_RETRIES
    }
}

/// Truncate an error message to [`ERROR_MESSAGE_MAX_LEN`] characters,
/// appending an ellipsis marker when cut.
#[must_use]
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX_LEN {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(ERROR_MESSAGE_MAX_LEN - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Paused,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("unknown".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());

        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Processing.is_active());
        assert!(JobStatus::Paused.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Failed.is_active());
    }

    #[test]
    fn test_truncate_error_short_message_unchanged() {
        assert_eq!(truncate_error("connection refused"), "connection refused");
    }

    #[test]
    fn test_truncate_error_long_message_bounded() {
        let long = "x".repeat(ERROR_MESSAGE_MAX_LEN + 500);
        let truncated = truncate_error(&long);
        assert_eq!(truncated.chars().count(), ERROR_MESSAGE_MAX_LEN);
        assert!(truncated.ends_with('…'));
    }
}
