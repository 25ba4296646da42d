//! Instrument model — the read side of the pipeline's narrow contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A monitored instrument, reduced to the fields the acquisition
/// pipeline needs.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique instrument identifier.
    pub id: Uuid,

    /// Display name.
    pub name: String,

    /// Station code on the upstream telemetry service. Absent for
    /// instruments that are not telemetry sources; a job against such an
    /// instrument is a configuration error.
    pub telemetry_station_code: Option<String>,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Instrument {
    /// Find an instrument by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r"
            SELECT id, name, telemetry_station_code, created_at
            FROM instruments
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Insert an instrument row. Used by provisioning flows and test
    /// fixtures; the wider backend owns the full entity.
    pub async fn create(
        pool: &PgPool,
        id: Uuid,
        name: &str,
        telemetry_station_code: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r"
            INSERT INTO instruments (id, name, telemetry_station_code)
            VALUES ($1, $2, $3)
            RETURNING id, name, telemetry_station_code, created_at
            ",
        )
        .bind(id)
        .bind(name)
        .bind(telemetry_station_code)
        .fetch_one(pool)
        .await
    }
}
