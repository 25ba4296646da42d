//! Error types for the telemetry client.

use thiserror::Error;

/// Telemetry service errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Authentication against the telemetry service failed.
    #[error("Telemetry authentication failed: {0}")]
    AuthFailed(String),

    /// Transport-level failure (connect, timeout, TLS).
    #[error("Telemetry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with an unexpected HTTP status.
    #[error("Telemetry service returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Invalid telemetry response: {0}")]
    InvalidResponse(String),
}

impl TelemetryError {
    /// Whether retrying the same request may succeed.
    ///
    /// Used by the client's internal backoff; the job-level retry
    /// accounting treats every telemetry error as retryable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            TelemetryError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            TelemetryError::UnexpectedStatus { status, .. } => {
                *status >= 500 || *status == 429
            }
            TelemetryError::AuthFailed(_) | TelemetryError::InvalidResponse(_) => false,
        }
    }
}
