//! Collection and aggregation helpers.
//!
//! Pure functions the processor runs over raw telemetry: defensive
//! numeric parsing, grouping by calendar date, daily averaging, and the
//! date arithmetic behind windows and progress units.

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use tracing::debug;

use damwatch_telemetry::client::window_end;
use damwatch_telemetry::TelemetryItem;

/// Parse a raw telemetry value.
///
/// Upstream values are textual and occasionally malformed; anything that
/// does not parse as a finite number is treated as absent, never as an
/// error. A comma decimal separator is tolerated.
#[must_use]
pub fn parse_value(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            debug!(raw, "Discarding unparseable telemetry value");
            None
        }
    }
}

/// Group parseable values by calendar date, ascending.
///
/// The upstream service may return dates outside the requested window;
/// every date returned is grouped and processed.
#[must_use]
pub fn group_values_by_date(items: &[TelemetryItem]) -> BTreeMap<NaiveDate, Vec<f64>> {
    let mut grouped: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();

    for item in items {
        let date = item.measured_at.date_naive();
        let values = grouped.entry(date).or_default();
        if let Some(value) = item.value.as_deref().and_then(parse_value) {
            values.push(value);
        }
    }

    grouped
}

/// Daily average, or `None` when the day carries no real data.
///
/// A day with no parseable values is no data. So is an average of
/// exactly 0.0: the upstream convention for this sensor type uses zero
/// as a placeholder, not a measurement.
#[must_use]
pub fn daily_average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let average = values.iter().sum::<f64>() / values.len() as f64;
    if average == 0.0 {
        return None;
    }

    Some(average)
}

/// Whole months from `from` to `to`, never negative.
///
/// This is the progress unit: a job's `processed_months` is the whole-
/// month distance from its start date to its checkpoint.
#[must_use]
pub fn whole_months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    if to <= from {
        return 0;
    }

    let mut months =
        (to.year() - from.year()) * 12 + (to.month() as i32 - from.month() as i32);
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0)
}

/// Last date of the window starting at `window_start`, clamped to the
/// job's end date.
#[must_use]
pub fn window_span_end(window_start: NaiveDate, job_end: NaiveDate) -> NaiveDate {
    window_end(window_start).min(job_end)
}

/// Number of days in the inclusive range `[from, to]`.
#[must_use]
pub fn days_inclusive(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(day: u32, value: Option<&str>) -> TelemetryItem {
        let measured_at: DateTime<Utc> = format!("2024-01-{day:02}T07:00:00Z").parse().unwrap();
        TelemetryItem {
            station_code: "STN-042".to_string(),
            measured_at,
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_value_accepts_plain_and_comma_decimals() {
        assert_eq!(parse_value("1500.00"), Some(1500.0));
        assert_eq!(parse_value("  1500,25 "), Some(1500.25));
        assert_eq!(parse_value("-3.5"), Some(-3.5));
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("n/a"), None);
        assert_eq!(parse_value("12.3.4"), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("inf"), None);
    }

    #[test]
    fn test_group_values_by_date_ascending_and_defensive() {
        let items = vec![
            item(3, Some("1600.00")),
            item(1, Some("1500.00")),
            item(1, Some("broken")),
            item(1, Some("1502.00")),
            item(2, None),
        ];

        let grouped = group_values_by_date(&items);
        let dates: Vec<NaiveDate> = grouped.keys().copied().collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]
        );

        assert_eq!(grouped[&date(2024, 1, 1)], vec![1500.0, 1502.0]);
        assert!(grouped[&date(2024, 1, 2)].is_empty());
        assert_eq!(grouped[&date(2024, 1, 3)], vec![1600.0]);
    }

    #[test]
    fn test_daily_average_zero_means_no_data() {
        assert_eq!(daily_average(&[]), None);
        assert_eq!(daily_average(&[0.0, 0.0]), None);
        assert_eq!(daily_average(&[1500.0, 1502.0]), Some(1501.0));
    }

    #[test]
    fn test_whole_months_between() {
        assert_eq!(whole_months_between(date(2024, 1, 1), date(2024, 1, 1)), 0);
        assert_eq!(whole_months_between(date(2024, 1, 1), date(2024, 1, 31)), 0);
        assert_eq!(whole_months_between(date(2024, 1, 1), date(2024, 2, 1)), 1);
        assert_eq!(whole_months_between(date(2024, 1, 15), date(2024, 3, 14)), 1);
        assert_eq!(whole_months_between(date(2024, 1, 15), date(2024, 3, 15)), 2);
        assert_eq!(whole_months_between(date(2020, 1, 1), date(2024, 1, 1)), 48);
        // Never negative, even with inverted arguments.
        assert_eq!(whole_months_between(date(2024, 3, 1), date(2024, 1, 1)), 0);
    }

    #[test]
    fn test_window_span_end_clamps_to_job_end() {
        assert_eq!(
            window_span_end(date(2024, 1, 1), date(2024, 12, 31)),
            date(2024, 1, 30)
        );
        assert_eq!(
            window_span_end(date(2024, 1, 1), date(2024, 1, 5)),
            date(2024, 1, 5)
        );
    }

    #[test]
    fn test_days_inclusive() {
        assert_eq!(days_inclusive(date(2024, 1, 1), date(2024, 1, 1)), 1);
        assert_eq!(days_inclusive(date(2024, 1, 1), date(2024, 1, 30)), 30);
    }
}
