//! Job service: owns the durable job store and the fast queue together.
//!
//! Every durable state transition goes through this type. The scheduler
//! and processor never touch job rows directly, which keeps the state
//! machine free of lost-update races between the worker and the sweeps.

use chrono::{Months, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use damwatch_db::models::{
    AcquisitionJob, CreateAcquisitionJob, InstrumentReading, JobStatus, NewInstrumentReading,
    MAX_RETRIES,
};

use crate::collect::whole_months_between;
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::queue::JobQueue;

/// Service for acquisition job state and queue signalling.
#[derive(Debug, Clone)]
pub struct JobService {
    pool: PgPool,
    queue: JobQueue,
    /// First date of every collection window (how far back history goes).
    collection_start_date: NaiveDate,
}

impl JobService {
    /// Create a new job service.
    #[must_use]
    pub fn new(pool: PgPool, queue: JobQueue, collection_start_date: NaiveDate) -> Self {
        Self {
            pool,
            queue,
            collection_start_date,
        }
    }

    // ------------------------------------------------------------------
    // Enqueue and recovery
    // ------------------------------------------------------------------

    /// Enqueue a historical collection job for an instrument.
    ///
    /// The collection range runs from the configured historical start
    /// date through one month past today (tolerating clock skew between
    /// this process and the upstream service). Fails with
    /// [`AcquisitionError::JobAlreadyActive`] if the instrument already
    /// has a non-terminal job; the partial unique index settles the race
    /// between concurrent calls.
    #[instrument(skip(self, instrument_name))]
    pub async fn enqueue_job(
        &self,
        instrument_id: Uuid,
        instrument_name: &str,
    ) -> AcquisitionResult<AcquisitionJob> {
        if AcquisitionJob::exists_active_for_instrument(&self.pool, instrument_id).await? {
            return Err(AcquisitionError::JobAlreadyActive(instrument_id));
        }

        let start_date = self.collection_start_date;
        let end_date = Utc::now()
            .date_naive()
            .checked_add_months(Months::new(1))
            .unwrap_or(NaiveDate::MAX);

        let input = CreateAcquisitionJob {
            instrument_id,
            instrument_name: instrument_name.to_string(),
            start_date,
            end_date,
            total_months: whole_months_between(start_date, end_date),
        };

        let job = match AcquisitionJob::create(&self.pool, &input).await {
            Ok(job) => job,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                // Lost the race against a concurrent enqueue.
                return Err(AcquisitionError::JobAlreadyActive(instrument_id));
            }
            Err(e) => return Err(e.into()),
        };

        // The queue is a hint, not the record: if the push fails the job
        // still exists and the recovery pass will re-offer it.
        if let Err(e) = self.queue.push_back(job.id).await {
            warn!(job_id = %job.id, error = %e, "Failed to push job to fast queue");
        }

        info!(
            job_id = %job.id,
            instrument_id = %instrument_id,
            start_date = %start_date,
            end_date = %end_date,
            total_months = job.total_months,
            "Enqueued acquisition job"
        );

        Ok(job)
    }

    /// Re-offer every recoverable job to the fast queue: queued rows and
    /// paused rows that still have retry budget.
    ///
    /// Invoked once at process startup; safe to invoke repeatedly since
    /// queue entries are idempotent wake-up hints.
    #[instrument(skip(self))]
    pub async fn recover_orphaned_jobs(&self) -> AcquisitionResult<usize> {
        let ids = AcquisitionJob::list_recoverable_ids(&self.pool).await?;
        let mut recovered = 0;

        for id in &ids {
            match self.queue.push_back(*id).await {
                Ok(()) => recovered += 1,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Failed to re-queue recoverable job");
                }
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered orphaned jobs onto fast queue");
        }

        Ok(recovered)
    }

    /// Check the one-active-job-per-instrument guard.
    pub async fn has_active_job_for_instrument(
        &self,
        instrument_id: Uuid,
    ) -> AcquisitionResult<bool> {
        Ok(AcquisitionJob::exists_active_for_instrument(&self.pool, instrument_id).await?)
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    /// Claim a queued job for processing, stamping its start time.
    ///
    /// Called before any external work so a crash mid-flight shows up as
    /// "stuck in processing" for the stalled sweep, never as silent loss.
    /// Returns `None` if the job is missing or not queued.
    pub async fn mark_as_processing(
        &self,
        id: Uuid,
    ) -> AcquisitionResult<Option<AcquisitionJob>> {
        Ok(AcquisitionJob::mark_processing(&self.pool, id).await?)
    }

    /// Advance the checkpoint and counters without writing readings.
    pub async fn update_progress(
        &self,
        job: &AcquisitionJob,
        checkpoint_date: NaiveDate,
        created_delta: i32,
        skipped_delta: i32,
    ) -> AcquisitionResult<()> {
        let processed_months = whole_months_between(job.start_date, checkpoint_date);
        let updated = AcquisitionJob::update_progress(
            &self.pool,
            job.id,
            checkpoint_date,
            created_delta,
            skipped_delta,
            processed_months,
        )
        .await?;

        if !updated {
            return Err(AcquisitionError::JobNotFound(job.id));
        }
        Ok(())
    }

    /// Persist a batch of readings and the matching progress update in
    /// one transaction.
    ///
    /// The checkpoint therefore never advances past a reading that did
    /// not land; a failure anywhere in the flush rolls everything back
    /// and the job resumes from the previous checkpoint.
    #[instrument(skip(self, job, readings), fields(job_id = %job.id, batch = readings.len()))]
    pub async fn commit_batch(
        &self,
        job: &AcquisitionJob,
        readings: &[NewInstrumentReading],
        checkpoint_date: NaiveDate,
        skipped_delta: i32,
    ) -> AcquisitionResult<()> {
        let processed_months = whole_months_between(job.start_date, checkpoint_date);
        let mut tx = self.pool.begin().await?;

        for reading in readings {
            InstrumentReading::create(&mut *tx, reading).await?;
        }

        AcquisitionJob::update_progress(
            &mut *tx,
            job.id,
            checkpoint_date,
            readings.len() as i32,
            skipped_delta,
            processed_months,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Mark the job as completed.
    pub async fn mark_as_completed(&self, id: Uuid) -> AcquisitionResult<()> {
        if !AcquisitionJob::mark_completed(&self.pool, id).await? {
            return Err(AcquisitionError::JobNotFound(id));
        }
        info!(job_id = %id, "Acquisition job completed");
        Ok(())
    }

    /// Mark the job as failed with a bounded-length reason.
    pub async fn mark_as_failed(&self, id: Uuid, reason: &str) -> AcquisitionResult<()> {
        if !AcquisitionJob::mark_failed(&self.pool, id, reason).await? {
            return Err(AcquisitionError::JobNotFound(id));
        }
        warn!(job_id = %id, reason, "Acquisition job failed");
        Ok(())
    }

    /// Mark the job as paused with a bounded-length reason. The paused
    /// sweep decides when to offer it back to the queue.
    pub async fn mark_as_paused(&self, id: Uuid, reason: &str) -> AcquisitionResult<()> {
        if !AcquisitionJob::mark_paused(&self.pool, id, reason).await? {
            return Err(AcquisitionError::JobNotFound(id));
        }
        warn!(job_id = %id, reason, "Acquisition job paused");
        Ok(())
    }

    /// Consume one unit of retry budget.
    ///
    /// Returns whether the job may still be retried: callers branch on
    /// this to choose between pausing (retry later) and failing
    /// (budget exhausted).
    pub async fn increment_retry(&self, id: Uuid) -> AcquisitionResult<bool> {
        match AcquisitionJob::increment_retry(&self.pool, id).await? {
            Some(retry_count) => Ok(retry_count < MAX_RETRIES),
            None => Err(AcquisitionError::JobNotFound(id)),
        }
    }

    /// Flip a paused job back to queued and offer it to the fast queue.
    pub async fn requeue_paused(&self, id: Uuid) -> AcquisitionResult<bool> {
        if !AcquisitionJob::requeue(&self.pool, id).await? {
            return Ok(false);
        }
        self.push_wakeup(id).await;
        info!(job_id = %id, "Requeued paused job");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Queue signalling
    // ------------------------------------------------------------------

    /// Offer a wake-up hint for a job. Push failures are logged and
    /// swallowed; the recovery pass covers for a lossy queue.
    pub async fn push_wakeup(&self, id: Uuid) {
        if let Err(e) = self.queue.push_back(id).await {
            warn!(job_id = %id, error = %e, "Failed to push wake-up hint");
        }
    }

    /// Return a popped hint to the front of the queue (worker pool full).
    pub async fn defer_wakeup(&self, id: Uuid) -> AcquisitionResult<()> {
        Ok(self.queue.push_front(id).await?)
    }

    /// Pop the next wake-up hint, if any.
    pub async fn pop_wakeup(&self) -> AcquisitionResult<Option<Uuid>> {
        Ok(self.queue.pop().await?)
    }

    /// Current fast queue length.
    pub async fn queue_len(&self) -> AcquisitionResult<usize> {
        Ok(self.queue.len().await?)
    }

    // ------------------------------------------------------------------
    // Read-only queries
    // ------------------------------------------------------------------

    /// Fetch a job by id.
    pub async fn get_job(&self, id: Uuid) -> AcquisitionResult<Option<AcquisitionJob>> {
        Ok(AcquisitionJob::find_by_id(&self.pool, id).await?)
    }

    /// Fetch the most recent job for an instrument.
    pub async fn get_job_for_instrument(
        &self,
        instrument_id: Uuid,
    ) -> AcquisitionResult<Option<AcquisitionJob>> {
        Ok(AcquisitionJob::find_latest_for_instrument(&self.pool, instrument_id).await?)
    }

    /// List the most recently created jobs.
    pub async fn list_recent(&self, limit: i64) -> AcquisitionResult<Vec<AcquisitionJob>> {
        Ok(AcquisitionJob::list_recent(&self.pool, limit).await?)
    }

    /// Processing jobs with no progress signal within the threshold.
    pub async fn list_stalled(
        &self,
        threshold_secs: i64,
    ) -> AcquisitionResult<Vec<AcquisitionJob>> {
        Ok(AcquisitionJob::list_stalled(&self.pool, threshold_secs).await?)
    }

    /// All currently paused jobs.
    pub async fn list_paused(&self) -> AcquisitionResult<Vec<AcquisitionJob>> {
        Ok(AcquisitionJob::list_by_status(&self.pool, JobStatus::Paused, i64::MAX).await?)
    }
}
