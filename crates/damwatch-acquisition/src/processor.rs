//! Job processor: runs one acquisition job from its checkpoint to the end
//! of its collection range.
//!
//! The processor never bubbles errors to its caller. Every outcome is
//! classified here and written back to the job record: completed, paused
//! with retry budget left, or failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use damwatch_db::models::{AcquisitionJob, Instrument, InstrumentReading, NewInstrumentReading};
use damwatch_telemetry::client::window_end;
use damwatch_telemetry::{AuthToken, TelemetryClient};

use crate::collect::{daily_average, days_inclusive, group_values_by_date, window_span_end};
use crate::error::{AcquisitionError, AcquisitionResult};
use crate::service::JobService;

/// Readings buffered before a transactional flush.
const READING_BATCH_SIZE: usize = 40;

/// Pause between consecutive window fetches; the upstream service is
/// rate limited and a tight loop trips it.
const INTER_WINDOW_DELAY: Duration = Duration::from_millis(500);

/// Imported readings carry a fixed nominal observation time.
const READING_HOUR: u32 = 7;

/// Input channel recorded on imported readings.
const INPUT_CHANNEL: &str = "telemetry";

/// Comment recorded on imported readings.
const READING_COMMENT: &str = "Imported from historical telemetry";

/// Processes acquisition jobs against the telemetry service.
#[derive(Debug, Clone)]
pub struct JobProcessor {
    pool: PgPool,
    service: Arc<JobService>,
    telemetry: TelemetryClient,
}

impl JobProcessor {
    /// Create a new processor.
    #[must_use]
    pub fn new(pool: PgPool, service: Arc<JobService>, telemetry: TelemetryClient) -> Self {
        Self {
            pool,
            service,
            telemetry,
        }
    }

    /// Run a single job to an outcome.
    ///
    /// Infallible by contract: failures are recorded on the job row, and
    /// a job that cannot be loaded or claimed is logged and dropped.
    #[instrument(skip(self))]
    pub async fn process(&self, job_id: Uuid) {
        let job = match self.service.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "Skipping queue entry with no job row");
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to load job, leaving for recovery");
                return;
            }
        };

        // Resolve the station code before claiming the job: a bad
        // instrument configuration is permanent and burns no retries.
        let station_code = match self.resolve_station_code(&job).await {
            Ok(code) => code,
            Err(e) => {
                self.record_failure(job_id, &e.to_string()).await;
                return;
            }
        };

        let job = match self.service.mark_as_processing(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!(job_id = %job_id, "Job no longer queued, dropping stale hint");
                return;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to claim job");
                return;
            }
        };

        info!(
            job_id = %job.id,
            instrument_id = %job.instrument_id,
            checkpoint = %job.checkpoint_date,
            end = %job.end_date,
            "Starting collection run"
        );

        match self.run_collection(&job, &station_code).await {
            Ok(()) => {
                if let Err(e) = self.service.mark_as_completed(job.id).await {
                    warn!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(e) if e.is_retryable() => self.record_retryable(job.id, &e).await,
            Err(e) => self.record_failure(job.id, &e.to_string()).await,
        }
    }

    /// Collect from the job's checkpoint to its end date, window by
    /// window. Progress lands transactionally as it is made, so an error
    /// here leaves a checkpoint the next attempt resumes from.
    async fn run_collection(
        &self,
        job: &AcquisitionJob,
        station_code: &str,
    ) -> AcquisitionResult<()> {
        let token = self.telemetry.authenticate().await?;
        let reading_time = NaiveTime::from_hms_opt(READING_HOUR, 0, 0)
            .unwrap_or(NaiveTime::MIN);

        let mut cursor = job.checkpoint_date;
        let mut batch: Vec<NewInstrumentReading> = Vec::with_capacity(READING_BATCH_SIZE);
        let mut pending_skipped: i32 = 0;
        let mut first_window = true;

        while cursor <= job.end_date {
            if !first_window {
                tokio::time::sleep(INTER_WINDOW_DELAY).await;
            }
            first_window = false;

            let items = self
                .telemetry
                .fetch_window(station_code, cursor, &token)
                .await?;
            let span_end = window_span_end(cursor, job.end_date);

            if items.is_empty() {
                // An empty window still advances the checkpoint: every
                // day in it counts as skipped.
                pending_skipped += days_inclusive(cursor, span_end) as i32;
                self.flush(job, &mut batch, span_end, &mut pending_skipped)
                    .await?;
            } else {
                self.collect_window(job, &items, span_end, reading_time, &mut batch, &mut pending_skipped)
                    .await?;
            }

            cursor = window_end(cursor).succ_opt().unwrap_or(NaiveDate::MAX);
        }

        // Remainder of the final window.
        self.flush(job, &mut batch, job.end_date, &mut pending_skipped)
            .await?;

        Ok(())
    }

    /// Aggregate one window's items into daily readings, flushing the
    /// batch whenever it reaches the threshold.
    async fn collect_window(
        &self,
        job: &AcquisitionJob,
        items: &[damwatch_telemetry::TelemetryItem],
        span_end: NaiveDate,
        reading_time: NaiveTime,
        batch: &mut Vec<NewInstrumentReading>,
        pending_skipped: &mut i32,
    ) -> AcquisitionResult<()> {
        let mut last_seen = job.checkpoint_date;

        for (date, values) in group_values_by_date(items) {
            // Stray dates beyond the window still get their reading, but
            // the checkpoint must never outrun the windows actually
            // fetched, or an interrupted run would resume past them.
            last_seen = last_seen.max(date.min(span_end));

            if InstrumentReading::exists(&self.pool, job.instrument_id, date).await? {
                debug!(job_id = %job.id, %date, "Reading already present, skipping day");
                *pending_skipped += 1;
                continue;
            }

            let Some(average) = daily_average(&values) else {
                debug!(job_id = %job.id, %date, "No usable data for day, skipping");
                *pending_skipped += 1;
                continue;
            };

            batch.push(NewInstrumentReading {
                instrument_id: job.instrument_id,
                reading_date: date,
                reading_time,
                input_channel: INPUT_CHANNEL.to_string(),
                value: average,
                comment: Some(READING_COMMENT.to_string()),
            });

            if batch.len() >= READING_BATCH_SIZE {
                self.flush(job, batch, last_seen, pending_skipped).await?;
            }
        }

        // The whole span is covered once the window is consumed, even if
        // its trailing days carried no data.
        self.flush(job, batch, span_end, pending_skipped).await?;

        Ok(())
    }

    /// Commit buffered readings and counters in one transaction and
    /// advance the checkpoint to `checkpoint`.
    async fn flush(
        &self,
        job: &AcquisitionJob,
        batch: &mut Vec<NewInstrumentReading>,
        checkpoint: NaiveDate,
        pending_skipped: &mut i32,
    ) -> AcquisitionResult<()> {
        if batch.is_empty() && *pending_skipped == 0 && checkpoint <= job.checkpoint_date {
            return Ok(());
        }

        if batch.is_empty() {
            self.service
                .update_progress(job, checkpoint, 0, *pending_skipped)
                .await?;
        } else {
            self.service
                .commit_batch(job, batch, checkpoint, *pending_skipped)
                .await?;
        }

        debug!(
            job_id = %job.id,
            created = batch.len(),
            skipped = *pending_skipped,
            checkpoint = %checkpoint,
            "Committed progress"
        );

        batch.clear();
        *pending_skipped = 0;
        Ok(())
    }

    /// Look up the job's instrument and its telemetry station code.
    async fn resolve_station_code(&self, job: &AcquisitionJob) -> AcquisitionResult<String> {
        let instrument = Instrument::find_by_id(&self.pool, job.instrument_id)
            .await?
            .ok_or(AcquisitionError::InstrumentNotFound(job.instrument_id))?;

        instrument
            .telemetry_station_code
            .filter(|code| !code.is_empty())
            .ok_or(AcquisitionError::MissingStationCode(job.instrument_id))
    }

    /// Consume retry budget and pause, or fail once the budget is gone.
    async fn record_retryable(&self, job_id: Uuid, error: &AcquisitionError) {
        let reason = error.to_string();

        match self.service.increment_retry(job_id).await {
            Ok(true) => {
                if let Err(e) = self.service.mark_as_paused(job_id, &reason).await {
                    warn!(job_id = %job_id, error = %e, "Failed to pause job");
                }
            }
            Ok(false) => self.record_failure(job_id, &reason).await,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to increment retry count");
            }
        }
    }

    async fn record_failure(&self, job_id: Uuid, reason: &str) {
        if let Err(e) = self.service.mark_as_failed(job_id, reason).await {
            warn!(job_id = %job_id, error = %e, "Failed to mark job failed");
        }
    }

    /// Authenticate eagerly, surfacing credential problems at startup
    /// instead of on the first job.
    pub async fn verify_credentials(&self) -> AcquisitionResult<AuthToken> {
        Ok(self.telemetry.authenticate().await?)
    }
}
