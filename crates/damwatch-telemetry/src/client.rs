//! Telemetry service HTTP client (reqwest-based).

use chrono::{DateTime, Days, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::TelemetryError;
use crate::retry::RetryPolicy;

/// Number of days covered by one measurement request.
pub const WINDOW_DAYS: u64 = 30;

/// Request timeout for telemetry calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials for the telemetry service.
///
/// The [`Debug`] impl redacts the password.
#[derive(Clone)]
pub struct TelemetryCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TelemetryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A bearer token obtained from the telemetry service.
///
/// Obtained once per job run and reused across all windows; if it
/// expires mid-run the resulting error surfaces as retryable.
#[derive(Debug, Clone)]
pub struct AuthToken {
    access_token: String,
}

impl AuthToken {
    /// The raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.access_token
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// A single raw upstream measurement.
///
/// The value is textual and may be malformed; callers parse it
/// defensively. Timestamps may fall outside the requested window — an
/// upstream quirk callers must tolerate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryItem {
    /// Upstream station code.
    pub station_code: String,
    /// Measurement timestamp.
    pub measured_at: DateTime<Utc>,
    /// Raw reading value, possibly absent or unparseable.
    pub value: Option<String>,
}

/// Client for the upstream telemetry service.
#[derive(Debug, Clone)]
pub struct TelemetryClient {
    http: Client,
    base_url: String,
    credentials: TelemetryCredentials,
    retry: RetryPolicy,
}

impl TelemetryClient {
    /// Create a client for the service at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        credentials: TelemetryCredentials,
    ) -> Result<Self, TelemetryError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            http,
            base_url,
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (shorter delays in tests).
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Authenticate and obtain a bearer token.
    ///
    /// Transient failures are retried with backoff before surfacing an
    /// error; a credential rejection is surfaced immediately.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<AuthToken, TelemetryError> {
        let url = format!("{}/api/v1/auth/token", self.base_url);

        self.retry
            .execute("authenticate", || async {
                let response = self
                    .http
                    .post(&url)
                    .json(&serde_json::json!({
                        "username": self.credentials.username,
                        "password": self.credentials.password,
                    }))
                    .send()
                    .await?;

                match response.status() {
                    StatusCode::OK => {
                        let token: TokenResponse = response.json().await.map_err(|e| {
                            TelemetryError::InvalidResponse(format!(
                                "token response decode failed: {e}"
                            ))
                        })?;
                        debug!("Obtained telemetry auth token");
                        Ok(AuthToken {
                            access_token: token.access_token,
                        })
                    }
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        let body = response.text().await.unwrap_or_default();
                        Err(TelemetryError::AuthFailed(body))
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        Err(TelemetryError::UnexpectedStatus {
                            status: status.as_u16(),
                            body,
                        })
                    }
                }
            })
            .await
    }

    /// Fetch all measurements for a station in the 30-day window
    /// starting at `window_start`.
    ///
    /// An empty list is a valid answer (the station simply has no data
    /// for the window). Items dated outside the window may be returned
    /// and are passed through untouched.
    #[instrument(skip(self, token), fields(station = station_code, start = %window_start))]
    pub async fn fetch_window(
        &self,
        station_code: &str,
        window_start: NaiveDate,
        token: &AuthToken,
    ) -> Result<Vec<TelemetryItem>, TelemetryError> {
        let url = format!(
            "{}/api/v1/stations/{}/measurements",
            self.base_url, station_code
        );
        let end = window_end(window_start);

        self.retry
            .execute("fetch_window", || async {
                let response = self
                    .http
                    .get(&url)
                    .bearer_auth(token.as_str())
                    .query(&[
                        ("start_date", window_start.to_string()),
                        ("end_date", end.to_string()),
                    ])
                    .send()
                    .await?;

                match response.status() {
                    StatusCode::OK => {
                        let items: Vec<TelemetryItem> = response.json().await.map_err(|e| {
                            TelemetryError::InvalidResponse(format!(
                                "measurement response decode failed: {e}"
                            ))
                        })?;
                        debug!(count = items.len(), "Fetched telemetry window");
                        Ok(items)
                    }
                    StatusCode::UNAUTHORIZED => Err(TelemetryError::AuthFailed(
                        "token rejected by telemetry service".to_string(),
                    )),
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        Err(TelemetryError::UnexpectedStatus {
                            status: status.as_u16(),
                            body,
                        })
                    }
                }
            })
            .await
    }
}

/// Last date of the window starting at `start` (inclusive).
#[must_use]
pub fn window_end(start: NaiveDate) -> NaiveDate {
    start
        .checked_add_days(Days::new(WINDOW_DAYS - 1))
        .unwrap_or(NaiveDate::MAX)
}
