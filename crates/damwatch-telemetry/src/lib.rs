//! Client for the upstream telemetry service.
//!
//! The service is slow, rate limited, and occasionally unreliable; the
//! client wraps authentication and windowed measurement retrieval behind
//! a typed error that tells callers whether a failure is worth retrying.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{
    AuthToken, TelemetryClient, TelemetryCredentials, TelemetryItem, WINDOW_DAYS,
};
pub use error::TelemetryError;
pub use retry::RetryPolicy;
