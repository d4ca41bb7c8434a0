//! Attendance aggregation engine
//!
//! Status counts over an optional date range and student-year filter,
//! plus the attendance-rate calculation. "School days" counts the
//! distinct calendar days on which attendance was actually taken, not
//! every weekday in the range, and ignores the year filter so the
//! denominator stays comparable across cohorts.

use anyhow::Result;
use chrono::NaiveDate;
use rollbook_common::types::{AttendanceStatus, YearLevel};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::attendance;

/// Aggregated counts for a date range and optional year filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: i64,
    pub late: i64,
    pub excused: i64,
    pub absent: i64,
    pub total_records: i64,
    pub school_days: i64,
}

/// Compute per-status counts and the school-day count.
///
/// An empty selection is all zeros, not an error; every status key is
/// present in the output even when its count is zero.
pub async fn status_counts(
    pool: &SqlitePool,
    range: Option<(NaiveDate, NaiveDate)>,
    year: Option<YearLevel>,
) -> Result<StatusCounts> {
    let rows = attendance::status_counts_in(pool, range, year.map(|y| y.as_str())).await?;

    let mut counts = StatusCounts {
        school_days: attendance::distinct_day_count(pool, range).await?,
        ..Default::default()
    };

    for (status, n) in rows {
        match status.parse::<AttendanceStatus>() {
            Ok(AttendanceStatus::Present) => counts.present = n,
            Ok(AttendanceStatus::Late) => counts.late = n,
            Ok(AttendanceStatus::Excused) => counts.excused = n,
            Ok(AttendanceStatus::Absent) => counts.absent = n,
            Err(_) => tracing::warn!(status = %status, "Skipping unknown status in aggregation"),
        }
    }

    counts.total_records = counts.present + counts.late + counts.excused + counts.absent;

    Ok(counts)
}

/// Attendance rate over "possible attendance slots": one slot per
/// student per school day. Present and Late both count as attended.
/// Returns 0.0 when either denominator factor is zero.
pub fn attendance_rate(total_students: i64, school_days: i64, present: i64, late: i64) -> f64 {
    if total_students <= 0 || school_days <= 0 {
        return 0.0;
    }

    let attended = (present + late) as f64;
    let slots = (total_students * school_days) as f64;
    let rate = attended / slots * 100.0;

    (rate * 10.0).round() / 10.0
}
