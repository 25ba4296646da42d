//! Acquisition scheduler: drains the fast queue onto a bounded worker
//! pool and runs the stalled and paused maintenance sweeps.
//!
//! One instance runs per process. All three activities share a single
//! select loop; each tick swallows and logs its own errors so a flaky
//! dependency degrades throughput without killing the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use damwatch_db::models::JobStatus;

use crate::processor::JobProcessor;
use crate::service::JobService;

/// Timer and pool tuning for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between drain passes over the fast queue.
    pub drain_interval_secs: u64,
    /// Delay before the first drain pass, letting connections settle.
    pub warmup_secs: u64,
    /// Maximum hints popped per drain pass.
    pub drain_batch_size: usize,
    /// Seconds between stalled-job sweeps.
    pub stalled_sweep_interval_secs: u64,
    /// Seconds between paused-job sweeps.
    pub paused_sweep_interval_secs: u64,
    /// Seconds without a progress update before a processing job counts
    /// as stalled.
    pub stall_threshold_secs: i64,
    /// Worker pool size: jobs processed concurrently.
    pub max_concurrent_jobs: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: 30,
            warmup_secs: 15,
            drain_batch_size: 10,
            stalled_sweep_interval_secs: 600,
            paused_sweep_interval_secs: 300,
            stall_threshold_secs: 3600,
            max_concurrent_jobs: 2,
        }
    }
}

/// Background scheduler for acquisition jobs.
pub struct AcquisitionScheduler {
    service: Arc<JobService>,
    processor: JobProcessor,
    config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
}

impl AcquisitionScheduler {
    /// Create a new scheduler.
    #[must_use]
    pub fn new(
        service: Arc<JobService>,
        processor: JobProcessor,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            service,
            processor,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the scheduler until shutdown is requested, then wait for
    /// in-flight jobs to finish.
    pub async fn run(&self) {
        info!(
            drain_interval_secs = self.config.drain_interval_secs,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Acquisition scheduler started"
        );

        let pool = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));

        let mut drain_tick = interval_at(
            Instant::now() + Duration::from_secs(self.config.warmup_secs),
            Duration::from_secs(self.config.drain_interval_secs),
        );
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stalled_tick = tokio::time::interval(Duration::from_secs(
            self.config.stalled_sweep_interval_secs,
        ));
        stalled_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut paused_tick = tokio::time::interval(Duration::from_secs(
            self.config.paused_sweep_interval_secs,
        ));
        paused_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.shutdown.load(Ordering::Relaxed) {
            tokio::select! {
                _ = drain_tick.tick() => {
                    if let Err(e) = self.drain_queue(&pool).await {
                        error!(error = %e, "Drain pass failed");
                    }
                }
                _ = stalled_tick.tick() => {
                    if let Err(e) = self.sweep_stalled().await {
                        error!(error = %e, "Stalled sweep failed");
                    }
                }
                _ = paused_tick.tick() => {
                    if let Err(e) = self.sweep_paused().await {
                        error!(error = %e, "Paused sweep failed");
                    }
                }
            }
        }

        info!("Scheduler draining in-flight jobs before exit");
        let _ = pool
            .acquire_many(self.config.max_concurrent_jobs as u32)
            .await;
        info!("Acquisition scheduler stopped");
    }

    /// Request shutdown. The running loop finishes its current tick and
    /// waits for in-flight jobs.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Pop up to a batch of hints and hand each to a pooled worker.
    ///
    /// When the pool is full the popped hint goes back to the front of
    /// the queue and the pass ends; the queue keeps its order and the
    /// next pass picks it up.
    async fn drain_queue(
        &self,
        pool: &Arc<Semaphore>,
    ) -> Result<(), crate::error::AcquisitionError> {
        let backlog = self.service.queue_len().await?;
        if backlog == 0 {
            return Ok(());
        }
        debug!(backlog, "Draining fast queue");

        for _ in 0..self.config.drain_batch_size {
            let Some(job_id) = self.service.pop_wakeup().await? else {
                break;
            };

            // Hints are non-authoritative: drop entries whose row is
            // gone or no longer queued before spending a pool slot.
            match self.service.get_job(job_id).await {
                Ok(Some(job)) if job.status == JobStatus::Queued => {}
                Ok(Some(job)) => {
                    debug!(job_id = %job_id, status = %job.status, "Dropping stale queue hint");
                    continue;
                }
                Ok(None) => {
                    debug!(job_id = %job_id, "Dropping queue hint with no job row");
                    continue;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to load job for queue hint");
                    continue;
                }
            }

            let permit = match Arc::clone(pool).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(job_id = %job_id, "Worker pool full, returning hint to queue");
                    self.service.defer_wakeup(job_id).await?;
                    break;
                }
            };

            let processor = self.processor.clone();
            tokio::spawn(async move {
                processor.process(job_id).await;
                drop(permit);
            });
        }

        Ok(())
    }

    /// Reclaim processing jobs whose owner stopped reporting progress.
    ///
    /// A stalled job consumes retry budget like any transient failure:
    /// back to paused while budget remains, failed once it runs out.
    /// One bad row never aborts the rest of the sweep.
    pub async fn sweep_stalled(&self) -> Result<(), crate::error::AcquisitionError> {
        let stalled = self
            .service
            .list_stalled(self.config.stall_threshold_secs)
            .await?;

        for job in stalled {
            warn!(
                job_id = %job.id,
                checkpoint = %job.checkpoint_date,
                "Reclaiming stalled job"
            );

            let outcome = match self.service.increment_retry(job.id).await {
                Ok(true) => {
                    let paused = self
                        .service
                        .mark_as_paused(job.id, "Stalled without progress, reclaimed")
                        .await;
                    if paused.is_ok() {
                        self.service.push_wakeup(job.id).await;
                    }
                    paused
                }
                Ok(false) => {
                    self.service
                        .mark_as_failed(job.id, "Stalled and retry budget exhausted")
                        .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = outcome {
                warn!(job_id = %job.id, error = %e, "Failed to reclaim stalled job");
            }
        }

        Ok(())
    }

    /// Offer paused jobs with remaining budget back to the queue; fail
    /// the rest. One bad row never aborts the rest of the sweep.
    pub async fn sweep_paused(&self) -> Result<(), crate::error::AcquisitionError> {
        let paused = self.service.list_paused().await?;

        for job in paused {
            let outcome = if job.can_retry() {
                self.service.requeue_paused(job.id).await.map(|_| ())
            } else {
                self.service
                    .mark_as_failed(job.id, "Retry budget exhausted")
                    .await
            };

            if let Err(e) = outcome {
                warn!(job_id = %job.id, error = %e, "Failed to sweep paused job");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = SchedulerConfig::default();
        assert!(config.drain_interval_secs > 0);
        assert!(config.drain_batch_size > 0);
        assert!(config.max_concurrent_jobs > 0);
        assert!(config.stall_threshold_secs > config.drain_interval_secs as i64);
    }
}
