//! Instrument reading model — the write side of the pipeline's narrow
//! contract.
//!
//! The pipeline only ever checks existence for (instrument, date) and
//! inserts daily values. Inserts are idempotent on that pair, which is
//! what makes "redo from checkpoint" safe.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A persisted daily reading for an instrument.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InstrumentReading {
    pub id: Uuid,
    pub instrument_id: Uuid,
    pub reading_date: NaiveDate,
    pub reading_time: NaiveTime,
    pub input_channel: String,
    pub value: f64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A pending reading creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstrumentReading {
    pub instrument_id: Uuid,
    pub reading_date: NaiveDate,
    pub reading_time: NaiveTime,
    pub input_channel: String,
    pub value: f64,
    pub comment: Option<String>,
}

impl InstrumentReading {
    /// Check whether a reading already exists for (instrument, date).
    pub async fn exists(
        pool: &PgPool,
        instrument_id: Uuid,
        reading_date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT EXISTS(
                SELECT 1 FROM instrument_readings
                WHERE instrument_id = $1 AND reading_date = $2
            )
            ",
        )
        .bind(instrument_id)
        .bind(reading_date)
        .fetch_one(pool)
        .await
    }

    /// Insert a reading. A duplicate (instrument, date) is a no-op.
    ///
    /// Takes any executor so a batch of inserts can share one
    /// transaction with the job's progress update.
    pub async fn create<'e, E>(
        executor: E,
        reading: &NewInstrumentReading,
    ) -> Result<bool, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let result = sqlx::query(
            r"
            INSERT INTO instrument_readings (
                instrument_id, reading_date, reading_time,
                input_channel, value, comment
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (instrument_id, reading_date) DO NOTHING
            ",
        )
        .bind(reading.instrument_id)
        .bind(reading.reading_date)
        .bind(reading.reading_time)
        .bind(&reading.input_channel)
        .bind(reading.value)
        .bind(&reading.comment)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count readings for an instrument within a date range (inclusive).
    pub async fn count_in_range(
        pool: &PgPool,
        instrument_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM instrument_readings
            WHERE instrument_id = $1 AND reading_date BETWEEN $2 AND $3
            ",
        )
        .bind(instrument_id)
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await
    }
}
