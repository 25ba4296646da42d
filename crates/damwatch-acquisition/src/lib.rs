//! Historical data acquisition pipeline.
//!
//! Bulk-imports years of time-series measurements for monitored
//! instruments from a slow, rate-limited external telemetry service.
//! Work is tracked in a durable job record (PostgreSQL) and signalled
//! through an ephemeral redis list; a scheduler drains the list onto a
//! bounded worker pool, detects stalled runs, and requeues paused jobs
//! until their retry budget runs out.
//!
//! Losing the redis list never loses data, only latency: the durable
//! store remains authoritative and [`JobService::recover_orphaned_jobs`]
//! re-derives queue entries from it at startup.

pub mod collect;
pub mod config;
pub mod error;
pub mod processor;
pub mod queue;
pub mod scheduler;
pub mod service;

pub use config::{AcquisitionConfig, ConfigError};
pub use error::{AcquisitionError, AcquisitionResult};
pub use processor::JobProcessor;
pub use queue::JobQueue;
pub use scheduler::{AcquisitionScheduler, SchedulerConfig};
pub use service::JobService;
