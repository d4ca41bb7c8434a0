//! Attendance record database operations
//!
//! One row per (student, calendar day); the table-level UNIQUE index
//! backs that invariant against racing writers.

use anyhow::Result;
use chrono::NaiveDate;
use rollbook_common::types::AttendanceStatus;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::students::{self, Student};

/// Persisted attendance record
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub guid: Uuid,
    /// Denormalized copy of the student's external identifier at write
    /// time; display-only, empty string when the student has none.
    #[serde(rename = "studentId")]
    pub student_id: String,
    #[serde(rename = "student")]
    pub student_guid: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: String,
    pub notes: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Attendance record joined to its student, for read endpoints.
/// The student is None when the record is orphaned (student deleted).
#[derive(Debug, Clone)]
pub struct RecordWithStudent {
    pub record: AttendanceRecord,
    pub student: Option<Student>,
}

// The joined student replaces the record's bare "student" reference in
// the JSON output, so this is serialized by hand instead of flattened.
impl Serialize for RecordWithStudent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(9))?;
        map.serialize_entry("guid", &self.record.guid)?;
        map.serialize_entry("studentId", &self.record.student_id)?;
        map.serialize_entry("student", &self.student)?;
        map.serialize_entry("date", &self.record.date)?;
        map.serialize_entry("status", &self.record.status)?;
        map.serialize_entry("reason", &self.record.reason)?;
        map.serialize_entry("notes", &self.record.notes)?;
        map.serialize_entry("createdAt", &self.record.created_at)?;
        map.serialize_entry("updatedAt", &self.record.updated_at)?;
        map.end()
    }
}

/// Fields for a fresh attendance row
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub student_id: String,
    pub student_guid: Uuid,
    pub day: NaiveDate,
    pub status: AttendanceStatus,
    pub reason: String,
    pub notes: String,
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<AttendanceRecord> {
    let guid_str: String = row.get("guid");
    let student_guid_str: String = row.get("student_guid");
    let status_str: String = row.get("status");

    Ok(AttendanceRecord {
        guid: Uuid::parse_str(&guid_str)?,
        student_id: row.get("student_id"),
        student_guid: Uuid::parse_str(&student_guid_str)?,
        date: row.get("day"),
        status: status_str.parse()?,
        reason: row.get("reason"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const SELECT_COLUMNS: &str = "guid, student_id, student_guid, day, status, \
                              reason, notes, created_at, updated_at";

/// Look up the record for a (student, day) pair
pub async fn find_for_day(
    pool: &SqlitePool,
    student_guid: Uuid,
    day: NaiveDate,
) -> Result<Option<AttendanceRecord>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM attendance_records WHERE student_guid = ? AND day = ?",
        SELECT_COLUMNS
    ))
    .bind(student_guid.to_string())
    .bind(day)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_record).transpose()
}

/// Insert a fresh record. A concurrent writer for the same (student, day)
/// makes this fail with a uniqueness violation; callers fall back to an
/// update rather than surfacing the constraint.
pub async fn insert_record(pool: &SqlitePool, new: &NewRecord) -> Result<AttendanceRecord> {
    let guid = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO attendance_records (
            guid, student_id, student_guid, day, status, reason, notes,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(guid.to_string())
    .bind(&new.student_id)
    .bind(new.student_guid.to_string())
    .bind(new.day)
    .bind(new.status.as_str())
    .bind(&new.reason)
    .bind(&new.notes)
    .execute(pool)
    .await?;

    find_for_day(pool, new.student_guid, new.day)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Inserted record not found for {}", new.student_guid))
}

/// Overwrite the marks of the existing record for (student, day),
/// refreshing the denormalized external-id copy and the modification
/// timestamp while leaving created_at untouched. Returns rows affected.
pub async fn update_for_day(
    pool: &SqlitePool,
    student_guid: Uuid,
    day: NaiveDate,
    student_id: &str,
    status: AttendanceStatus,
    reason: &str,
    notes: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE attendance_records SET
            student_id = ?, status = ?, reason = ?, notes = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE student_guid = ? AND day = ?
        "#,
    )
    .bind(student_id)
    .bind(status.as_str())
    .bind(reason)
    .bind(notes)
    .bind(student_guid.to_string())
    .bind(day)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete the record for (student, day), if any. Deleting nothing is not
/// an error; returns rows affected.
pub async fn delete_for_day(pool: &SqlitePool, student_guid: Uuid, day: NaiveDate) -> Result<u64> {
    let result = sqlx::query("DELETE FROM attendance_records WHERE student_guid = ? AND day = ?")
        .bind(student_guid.to_string())
        .bind(day)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// All records for one calendar day, joined to their students
pub async fn list_for_day(pool: &SqlitePool, day: NaiveDate) -> Result<Vec<RecordWithStudent>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM attendance_records WHERE day = ? ORDER BY created_at ASC",
        SELECT_COLUMNS
    ))
    .bind(day)
    .fetch_all(pool)
    .await?;

    let mut joined = Vec::with_capacity(rows.len());
    for row in &rows {
        let record = row_to_record(row)?;
        let student = students::get_student(pool, record.student_guid).await?;
        joined.push(RecordWithStudent { record, student });
    }

    Ok(joined)
}

/// Records for one student, newest first, optionally bounded to an
/// inclusive [start, end] day range.
pub async fn list_for_student(
    pool: &SqlitePool,
    student_guid: Uuid,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<Vec<AttendanceRecord>> {
    let mut sql = format!(
        "SELECT {} FROM attendance_records WHERE student_guid = ?",
        SELECT_COLUMNS
    );
    if range.is_some() {
        sql.push_str(" AND day >= ? AND day <= ?");
    }
    sql.push_str(" ORDER BY day DESC");

    let mut query = sqlx::query(&sql).bind(student_guid.to_string());
    if let Some((start, end)) = range {
        query = query.bind(start).bind(end);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_record).collect()
}

/// Records matching a status on one calendar day, joined to students,
/// newest first. Backs the chat attendance query.
pub async fn list_for_day_with_status(
    pool: &SqlitePool,
    day: Option<NaiveDate>,
    status: Option<AttendanceStatus>,
    limit: i64,
) -> Result<Vec<RecordWithStudent>> {
    let mut sql = format!(
        "SELECT {} FROM attendance_records WHERE 1=1",
        SELECT_COLUMNS
    );
    if day.is_some() {
        sql.push_str(" AND day = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY day DESC LIMIT ?");

    let mut query = sqlx::query(&sql);
    if let Some(d) = day {
        query = query.bind(d);
    }
    if let Some(s) = status {
        query = query.bind(s.as_str());
    }
    query = query.bind(limit);

    let rows = query.fetch_all(pool).await?;
    let mut joined = Vec::with_capacity(rows.len());
    for row in &rows {
        let record = row_to_record(row)?;
        let student = students::get_student(pool, record.student_guid).await?;
        joined.push(RecordWithStudent { record, student });
    }

    Ok(joined)
}

/// Per-status record counts, optionally bounded by day range and filtered
/// by student year (applied on the record-student join).
pub async fn status_counts_in(
    pool: &SqlitePool,
    range: Option<(NaiveDate, NaiveDate)>,
    year: Option<&str>,
) -> Result<Vec<(String, i64)>> {
    let mut sql = String::from(
        "SELECT ar.status, COUNT(*) AS n FROM attendance_records ar \
         JOIN students s ON s.guid = ar.student_guid WHERE 1=1",
    );
    if range.is_some() {
        sql.push_str(" AND ar.day >= ? AND ar.day <= ?");
    }
    if year.is_some() {
        sql.push_str(" AND s.year = ?");
    }
    sql.push_str(" GROUP BY ar.status");

    let mut query = sqlx::query(&sql);
    if let Some((start, end)) = range {
        query = query.bind(start).bind(end);
    }
    if let Some(y) = year {
        query = query.bind(y);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
        .collect())
}

/// Count of distinct calendar days with at least one record in range.
/// Deliberately independent of any student-attribute filter.
pub async fn distinct_day_count(
    pool: &SqlitePool,
    range: Option<(NaiveDate, NaiveDate)>,
) -> Result<i64> {
    let mut sql = String::from("SELECT COUNT(DISTINCT day) FROM attendance_records WHERE 1=1");
    if range.is_some() {
        sql.push_str(" AND day >= ? AND day <= ?");
    }

    let mut query = sqlx::query_scalar(&sql);
    if let Some((start, end)) = range {
        query = query.bind(start).bind(end);
    }

    let count: i64 = query.fetch_one(pool).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::students::{insert_student, NewStudent};
    use crate::db::test_pool;
    use rollbook_common::types::{Sex, YearLevel};

    async fn add_student(pool: &SqlitePool, name: &str) -> Student {
        insert_student(
            pool,
            &NewStudent {
                name: name.to_string(),
                sex: Sex::Male,
                year: YearLevel::Year3,
                student_id: None,
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

    #[tokio::test]
    async fn second_insert_for_same_day_violates_uniqueness() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Dara").await;

        let new = NewRecord {
            student_id: String::new(),
            student_guid: student.guid,
            day: day("2024-03-01"),
            status: AttendanceStatus::Present,
            reason: String::new(),
            notes: String::new(),
        };
        insert_record(&pool, &new).await.unwrap();

        let err = insert_record(&pool, &new)
            .await
            .expect_err("duplicate (student, day) insert should fail");
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn update_preserves_created_at() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Dara").await;
        let d = day("2024-03-01");

        let created = insert_record(
            &pool,
            &NewRecord {
                student_id: String::new(),
                student_guid: student.guid,
                day: d,
                status: AttendanceStatus::Present,
                reason: String::new(),
                notes: String::new(),
            },
        )
        .await
        .unwrap();

        let affected = update_for_day(
            &pool,
            student.guid,
            d,
            "",
            AttendanceStatus::Late,
            "overslept",
            "",
        )
        .await
        .unwrap();
        assert_eq!(affected, 1);

        let updated = find_for_day(&pool, student.guid, d).await.unwrap().unwrap();
        assert_eq!(updated.guid, created.guid);
        assert_eq!(updated.status, AttendanceStatus::Late);
        assert_eq!(updated.reason, "overslept");
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn delete_for_day_is_idempotent() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Dara").await;
        let d = day("2024-03-01");

        assert_eq!(delete_for_day(&pool, student.guid, d).await.unwrap(), 0);

        insert_record(
            &pool,
            &NewRecord {
                student_id: String::new(),
                student_guid: student.guid,
                day: d,
                status: AttendanceStatus::Present,
                reason: String::new(),
                notes: String::new(),
            },
        )
        .await
        .unwrap();

        assert_eq!(delete_for_day(&pool, student.guid, d).await.unwrap(), 1);
        assert!(find_for_day(&pool, student.guid, d).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_for_student_orders_newest_first() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Dara").await;

        for d in ["2024-03-01", "2024-03-04", "2024-03-02"] {
            insert_record(
                &pool,
                &NewRecord {
                    student_id: String::new(),
                    student_guid: student.guid,
                    day: day(d),
                    status: AttendanceStatus::Present,
                    reason: String::new(),
                    notes: String::new(),
                },
            )
            .await
            .unwrap();
        }

        let records = list_for_student(&pool, student.guid, None).await.unwrap();
        let days: Vec<_> = records.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(days, ["2024-03-04", "2024-03-02", "2024-03-01"]);

        let bounded = list_for_student(
            &pool,
            student.guid,
            Some((day("2024-03-01"), day("2024-03-02"))),
        )
        .await
        .unwrap();
        assert_eq!(bounded.len(), 2);
    }

    #[tokio::test]
    async fn joined_listing_survives_orphaned_records() {
        let pool = test_pool().await;
        let student = add_student(&pool, "Dara").await;
        let d = day("2024-03-01");

        insert_record(
            &pool,
            &NewRecord {
                student_id: String::new(),
                student_guid: student.guid,
                day: d,
                status: AttendanceStatus::Absent,
                reason: String::new(),
                notes: String::new(),
            },
        )
        .await
        .unwrap();

        // Deleting the student leaves the record orphaned but readable
        crate::db::students::delete_student(&pool, student.guid)
            .await
            .unwrap();

        let listed = list_for_day(&pool, d).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].student.is_none());
    }
}
