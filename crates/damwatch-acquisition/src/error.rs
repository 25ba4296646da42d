//! Error taxonomy for the acquisition pipeline.
//!
//! Only telemetry errors consume retry budget; configuration problems
//! and unexpected failures fail the job immediately.

use thiserror::Error;
use uuid::Uuid;

use damwatch_telemetry::TelemetryError;

/// Acquisition pipeline errors.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// An active job already exists for the instrument.
    #[error("An active acquisition job already exists for instrument {0}")]
    JobAlreadyActive(Uuid),

    /// Job not found.
    #[error("Acquisition job not found: {0}")]
    JobNotFound(Uuid),

    /// Instrument not found.
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(Uuid),

    /// The instrument is not configured as a telemetry source.
    #[error("Instrument {0} has no telemetry station code")]
    MissingStationCode(Uuid),

    /// External telemetry service failure (auth, timeout, 5xx).
    #[error("Telemetry service error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Fast queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),
}

/// Result type for acquisition operations.
pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

impl AcquisitionError {
    /// Whether this failure is worth a retry (pausing the job) rather
    /// than failing it outright.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, AcquisitionError::Telemetry(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_telemetry_errors_are_retryable() {
        let id = Uuid::new_v4();

        assert!(AcquisitionError::Telemetry(TelemetryError::AuthFailed(
            "expired".to_string()
        ))
        .is_retryable());

        assert!(!AcquisitionError::MissingStationCode(id).is_retryable());
        assert!(!AcquisitionError::JobAlreadyActive(id).is_retryable());
        assert!(!AcquisitionError::Database(sqlx::Error::RowNotFound).is_retryable());
    }
}
