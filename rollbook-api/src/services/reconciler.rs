//! Attendance reconciliation engine
//!
//! Maintains the one-record-per-student-per-day invariant under single
//! and batch writes. The write path is check-then-act: look up the
//! existing record, update it in place, otherwise insert. A racing
//! writer can make the insert hit the UNIQUE(student_guid, day)
//! constraint; that rejection is converted into a retry-as-update and
//! never reaches the caller.

use chrono::NaiveDate;
use rollbook_common::types::AttendanceStatus;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{self, attendance, students};
use crate::db::attendance::{AttendanceRecord, NewRecord};
use crate::error::{ApiError, ApiResult};

/// Parse a caller-supplied date to a calendar day, stripping any
/// time-of-day component. Accepts `YYYY-MM-DD` and RFC 3339 datetimes.
pub fn normalize_day(input: &str) -> ApiResult<NaiveDate> {
    if let Ok(day) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(day);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(input) {
        return Ok(dt.date_naive());
    }
    Err(ApiError::BadRequest(format!("Invalid date: {}", input)))
}

/// Outcome of a single-record write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Created,
    Updated,
}

/// Record or overwrite one day's attendance for the student with the
/// given external identifier.
pub async fn record_single(
    pool: &SqlitePool,
    student_external_id: &str,
    day: NaiveDate,
    status: AttendanceStatus,
    reason: Option<String>,
    notes: Option<String>,
) -> ApiResult<(AttendanceRecord, WriteAction)> {
    let student = students::find_by_external_id(pool, student_external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    let reason = reason.unwrap_or_default();
    let notes = notes.unwrap_or_default();
    let id_copy = student.student_id.clone().unwrap_or_default();

    if attendance::find_for_day(pool, student.guid, day).await?.is_some() {
        let record = overwrite(pool, student.guid, day, &id_copy, status, &reason, &notes).await?;
        return Ok((record, WriteAction::Updated));
    }

    let new = NewRecord {
        student_id: id_copy.clone(),
        student_guid: student.guid,
        day,
        status,
        reason: reason.clone(),
        notes: notes.clone(),
    };

    match attendance::insert_record(pool, &new).await {
        Ok(record) => Ok((record, WriteAction::Created)),
        // Lost the race to a concurrent writer for the same (student,
        // day); the constraint held, so finish as an update.
        Err(err) if db::is_unique_violation(&err) => {
            let record =
                overwrite(pool, student.guid, day, &id_copy, status, &reason, &notes).await?;
            Ok((record, WriteAction::Updated))
        }
        Err(err) => Err(err.into()),
    }
}

async fn overwrite(
    pool: &SqlitePool,
    student_guid: Uuid,
    day: NaiveDate,
    id_copy: &str,
    status: AttendanceStatus,
    reason: &str,
    notes: &str,
) -> ApiResult<AttendanceRecord> {
    attendance::update_for_day(pool, student_guid, day, id_copy, status, reason, notes).await?;
    attendance::find_for_day(pool, student_guid, day)
        .await?
        .ok_or_else(|| ApiError::Internal("Updated record vanished".to_string()))
}

/// Batch-write vocabulary: the four persisted statuses plus the
/// "Unmarked" sentinel, which deletes the day's record instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Present,
    Absent,
    Late,
    Excused,
    Unmarked,
}

impl BatchStatus {
    fn as_mark(self) -> Option<AttendanceStatus> {
        match self {
            BatchStatus::Present => Some(AttendanceStatus::Present),
            BatchStatus::Absent => Some(AttendanceStatus::Absent),
            BatchStatus::Late => Some(AttendanceStatus::Late),
            BatchStatus::Excused => Some(AttendanceStatus::Excused),
            BatchStatus::Unmarked => None,
        }
    }
}

/// One entry of a batch write. `student` is a direct reference
/// (students.guid), unlike the single path which takes the external id.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntry {
    #[serde(rename = "studentId")]
    pub student: String,
    pub date: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Successful batch outcome: either the saved record or a deletion note
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    Saved(AttendanceRecord),
    Deleted {
        #[serde(rename = "studentId")]
        student: String,
        date: String,
        action: &'static str,
    },
}

/// Entry-level batch failure, keyed by the original reference
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntryError {
    #[serde(rename = "studentId")]
    pub student: String,
    pub error: String,
}

/// Batch result: parallel success and error lists, in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<BatchOutcome>,
    pub errors: Vec<BatchEntryError>,
}

/// Apply a batch of attendance changes. Entries are processed
/// sequentially and independently: one bad entry never aborts the batch,
/// and entries already applied are not rolled back.
pub async fn record_batch(pool: &SqlitePool, entries: &[BatchEntry]) -> BatchReport {
    let mut report = BatchReport::default();

    for entry in entries {
        match apply_entry(pool, entry).await {
            Ok(outcome) => report.results.push(outcome),
            Err(message) => {
                tracing::warn!(student = %entry.student, error = %message, "Batch entry failed");
                report.errors.push(BatchEntryError {
                    student: entry.student.clone(),
                    error: message,
                });
            }
        }
    }

    report
}

async fn apply_entry(pool: &SqlitePool, entry: &BatchEntry) -> Result<BatchOutcome, String> {
    let student = match Uuid::parse_str(&entry.student) {
        Ok(guid) => students::get_student(pool, guid)
            .await
            .map_err(|e| e.to_string())?,
        Err(_) => None,
    };
    let Some(student) = student else {
        return Err("Student not found".to_string());
    };

    let day = normalize_day(&entry.date).map_err(|e| e.to_string())?;

    let Some(status) = entry.status.as_mark() else {
        // Unmarked reverts the day to "no record"; deleting nothing is
        // still a success.
        attendance::delete_for_day(pool, student.guid, day)
            .await
            .map_err(|e| e.to_string())?;
        return Ok(BatchOutcome::Deleted {
            student: entry.student.clone(),
            date: entry.date.clone(),
            action: "deleted",
        });
    };

    let id_copy = student.student_id.clone().unwrap_or_default();
    let reason = entry.reason.clone().unwrap_or_default();
    let notes = entry.notes.clone().unwrap_or_default();

    let existing = attendance::find_for_day(pool, student.guid, day)
        .await
        .map_err(|e| e.to_string())?;

    let record = if existing.is_some() {
        attendance::update_for_day(pool, student.guid, day, &id_copy, status, &reason, &notes)
            .await
            .map_err(|e| e.to_string())?;
        attendance::find_for_day(pool, student.guid, day)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "Updated record vanished".to_string())?
    } else {
        let new = NewRecord {
            student_id: id_copy.clone(),
            student_guid: student.guid,
            day,
            status,
            reason: reason.clone(),
            notes: notes.clone(),
        };
        match attendance::insert_record(pool, &new).await {
            Ok(record) => record,
            Err(err) if db::is_unique_violation(&err) => {
                attendance::update_for_day(
                    pool,
                    student.guid,
                    day,
                    &id_copy,
                    status,
                    &reason,
                    &notes,
                )
                .await
                .map_err(|e| e.to_string())?;
                attendance::find_for_day(pool, student.guid, day)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| "Updated record vanished".to_string())?
            }
            Err(err) => return Err(err.to_string()),
        }
    };

    Ok(BatchOutcome::Saved(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::students::{insert_student, NewStudent};
    use crate::db::test_pool;
    use rollbook_common::types::{Sex, YearLevel};

    async fn add_student(pool: &SqlitePool, name: &str, external: Option<&str>) -> crate::db::students::Student {
        insert_student(
            pool,
            &NewStudent {
                name: name.to_string(),
                sex: Sex::Female,
                year: YearLevel::Year5,
                student_id: external.map(str::to_string),
                date_of_birth: None,
                email: None,
                phone: None,
                address: None,
            },
        )
        .await
        .unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn normalize_day_strips_time_of_day() {
        assert_eq!(normalize_day("2024-03-01").unwrap(), day("2024-03-01"));
        assert_eq!(
            normalize_day("2024-03-01T14:35:00Z").unwrap(),
            day("2024-03-01")
        );
        assert!(normalize_day("March 1st").is_err());
    }

    #[tokio::test]
    async fn single_write_creates_then_updates_in_place() {
        let pool = test_pool().await;
        add_student(&pool, "Amina", Some("S-1")).await;
        let d = day("2024-03-01");

        let (first, action) =
            record_single(&pool, "S-1", d, AttendanceStatus::Present, None, None)
                .await
                .unwrap();
        assert_eq!(action, WriteAction::Created);
        assert_eq!(first.status, AttendanceStatus::Present);
        assert_eq!(first.student_id, "S-1");

        let (second, action) =
            record_single(&pool, "S-1", d, AttendanceStatus::Late, None, None)
                .await
                .unwrap();
        assert_eq!(action, WriteAction::Updated);
        assert_eq!(second.guid, first.guid);
        assert_eq!(second.status, AttendanceStatus::Late);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn single_write_rejects_unknown_external_id() {
        let pool = test_pool().await;
        let err = record_single(
            &pool,
            "NO-SUCH",
            day("2024-03-01"),
            AttendanceStatus::Present,
            None,
            None,
        )
        .await
        .expect_err("unknown student should fail");
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn repeated_writes_leave_exactly_one_record() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Amina", Some("S-1")).await;
        let d = day("2024-03-01");

        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Excused,
        ] {
            record_single(&pool, "S-1", d, status, None, None).await.unwrap();
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance_records WHERE student_guid = ? AND day = ?",
        )
        .bind(student.guid.to_string())
        .bind(d)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let record = attendance::find_for_day(&pool, student.guid, d)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Excused);
    }

    #[tokio::test]
    async fn batch_upserts_and_unmarks_together() {
        let pool = test_pool().await;
        let s1 = add_student(&pool, "One", Some("S-1")).await;
        let s2 = add_student(&pool, "Two", None).await;

        // S2 starts with a Present record for the day
        record_batch(
            &pool,
            &[BatchEntry {
                student: s2.guid.to_string(),
                date: "2024-03-01".to_string(),
                status: BatchStatus::Present,
                reason: None,
                notes: None,
            }],
        )
        .await;

        let report = record_batch(
            &pool,
            &[
                BatchEntry {
                    student: s1.guid.to_string(),
                    date: "2024-03-01".to_string(),
                    status: BatchStatus::Present,
                    reason: None,
                    notes: None,
                },
                BatchEntry {
                    student: s2.guid.to_string(),
                    date: "2024-03-01".to_string(),
                    status: BatchStatus::Unmarked,
                    reason: None,
                    notes: None,
                },
            ],
        )
        .await;

        assert_eq!(report.results.len(), 2);
        assert!(report.errors.is_empty());

        let d = day("2024-03-01");
        assert!(attendance::find_for_day(&pool, s1.guid, d).await.unwrap().is_some());
        assert!(attendance::find_for_day(&pool, s2.guid, d).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unmark_of_absent_record_still_succeeds() {
        let pool = test_pool().await;
        let student = add_student(&pool, "One", None).await;

        let report = record_batch(
            &pool,
            &[BatchEntry {
                student: student.guid.to_string(),
                date: "2024-03-01".to_string(),
                status: BatchStatus::Unmarked,
                reason: None,
                notes: None,
            }],
        )
        .await;

        assert!(report.errors.is_empty());
        assert!(matches!(
            report.results[0],
            BatchOutcome::Deleted { action: "deleted", .. }
        ));
    }

    #[tokio::test]
    async fn bad_entry_does_not_abort_the_batch() {
        let pool = test_pool().await;
        let good = add_student(&pool, "Good", None).await;
        let ghost = Uuid::new_v4().to_string();

        let report = record_batch(
            &pool,
            &[
                BatchEntry {
                    student: ghost.clone(),
                    date: "2024-03-01".to_string(),
                    status: BatchStatus::Present,
                    reason: None,
                    notes: None,
                },
                BatchEntry {
                    student: good.guid.to_string(),
                    date: "2024-03-01".to_string(),
                    status: BatchStatus::Late,
                    reason: Some("bus".to_string()),
                    notes: None,
                },
            ],
        )
        .await;

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].student, ghost);
        assert_eq!(report.errors[0].error, "Student not found");

        assert_eq!(report.results.len(), 1);
        let record = attendance::find_for_day(&pool, good.guid, day("2024-03-01"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.reason, "bus");
    }

    #[tokio::test]
    async fn batch_refreshes_external_id_copy() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Copy", Some("EXT-7")).await;

        let report = record_batch(
            &pool,
            &[BatchEntry {
                student: student.guid.to_string(),
                date: "2024-03-01".to_string(),
                status: BatchStatus::Present,
                reason: None,
                notes: None,
            }],
        )
        .await;

        match &report.results[0] {
            BatchOutcome::Saved(record) => assert_eq!(record.student_id, "EXT-7"),
            other => panic!("Expected saved record, got {:?}", other),
        }
    }
}
