//! Environment-driven configuration for the acquisition daemon.

use chrono::NaiveDate;
use thiserror::Error;

use crate::scheduler::SchedulerConfig;

/// Default first date of historical collection.
const DEFAULT_COLLECTION_START: &str = "2000-01-01";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Missing required environment variable: {var}")]
    Missing { var: String },

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Runtime configuration for the acquisition pipeline.
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Redis connection string for the fast queue.
    pub redis_url: String,
    /// Base URL of the upstream telemetry service.
    pub telemetry_base_url: String,
    /// Telemetry service account username.
    pub telemetry_username: String,
    /// Telemetry service account password.
    pub telemetry_password: String,
    /// First date of every collection range.
    pub collection_start_date: NaiveDate,
    /// Scheduler timer and pool tuning.
    pub scheduler: SchedulerConfig,
}

impl AcquisitionConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut scheduler = SchedulerConfig::default();

        if let Some(secs) = opt_parsed::<u64>("ACQUISITION_DRAIN_INTERVAL_SECS")? {
            scheduler.drain_interval_secs = secs;
        }
        if let Some(size) = opt_parsed::<usize>("ACQUISITION_DRAIN_BATCH_SIZE")? {
            scheduler.drain_batch_size = size;
        }
        if let Some(secs) = opt_parsed::<u64>("ACQUISITION_STALLED_SWEEP_SECS")? {
            scheduler.stalled_sweep_interval_secs = secs;
        }
        if let Some(secs) = opt_parsed::<u64>("ACQUISITION_PAUSED_SWEEP_SECS")? {
            scheduler.paused_sweep_interval_secs = secs;
        }
        if let Some(secs) = opt_parsed::<i64>("ACQUISITION_STALL_THRESHOLD_SECS")? {
            scheduler.stall_threshold_secs = secs;
        }
        if let Some(n) = opt_parsed::<usize>("ACQUISITION_MAX_CONCURRENT_JOBS")? {
            scheduler.max_concurrent_jobs = n;
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            telemetry_base_url: required("TELEMETRY_BASE_URL")?,
            telemetry_username: required("TELEMETRY_USERNAME")?,
            telemetry_password: required("TELEMETRY_PASSWORD")?,
            collection_start_date: parse_date(
                "ACQUISITION_START_DATE",
                std::env::var("ACQUISITION_START_DATE")
                    .unwrap_or_else(|_| DEFAULT_COLLECTION_START.to_string()),
            )?,
            scheduler,
        })
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing {
        var: var.to_string(),
    })
}

fn parse_date(var: &str, value: String) -> Result<NaiveDate, ConfigError> {
    value
        .parse::<NaiveDate>()
        .map_err(|e| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn opt_parsed<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_accepts_iso_dates() {
        assert_eq!(
            parse_date("X", "2000-01-01".to_string()).unwrap(),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("ACQUISITION_START_DATE", "not-a-date".to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "ACQUISITION_START_DATE"));
    }
}
