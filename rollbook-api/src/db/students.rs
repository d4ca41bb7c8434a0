//! Student database operations

use anyhow::Result;
use chrono::NaiveDate;
use rollbook_common::types::{Sex, YearLevel};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Student record
#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub guid: Uuid,
    /// External identifier. None means "no value", never empty string,
    /// so the sparse uniqueness constraint stays out of the way.
    #[serde(rename = "studentId", skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub name: String,
    pub sex: Sex,
    pub year: YearLevel,
    #[serde(rename = "dateOfBirth", skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Fields accepted when creating a student
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub sex: Sex,
    pub year: YearLevel,
    #[serde(rename = "studentId", default)]
    pub student_id: Option<String>,
    #[serde(rename = "dateOfBirth", default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial patch for an existing student; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub sex: Option<Sex>,
    pub year: Option<YearLevel>,
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
    #[serde(rename = "dateOfBirth")]
    pub date_of_birth: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

fn row_to_student(row: &sqlx::sqlite::SqliteRow) -> Result<Student> {
    let guid_str: String = row.get("guid");
    let sex_str: String = row.get("sex");
    let year_str: String = row.get("year");
    let dob_str: Option<String> = row.get("date_of_birth");

    Ok(Student {
        guid: Uuid::parse_str(&guid_str)?,
        student_id: row.get("student_id"),
        name: row.get("name"),
        sex: sex_str.parse()?,
        year: year_str.parse()?,
        date_of_birth: dob_str
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()?,
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const SELECT_COLUMNS: &str = "guid, student_id, name, sex, year, date_of_birth, \
                              email, phone, address, created_at, updated_at";

/// Insert a new student. A duplicate external identifier surfaces as a
/// uniqueness violation for the caller to map to a conflict.
pub async fn insert_student(pool: &SqlitePool, new: &NewStudent) -> Result<Student> {
    let guid = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO students (
            guid, student_id, name, sex, year, date_of_birth,
            email, phone, address, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(guid.to_string())
    .bind(&new.student_id)
    .bind(&new.name)
    .bind(new.sex.as_str())
    .bind(new.year.as_str())
    .bind(new.date_of_birth)
    .bind(&new.email)
    .bind(&new.phone)
    .bind(&new.address)
    .execute(pool)
    .await?;

    get_student(pool, guid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Inserted student not found: {}", guid))
}

/// Load a student by primary key
pub async fn get_student(pool: &SqlitePool, guid: Uuid) -> Result<Option<Student>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM students WHERE guid = ?",
        SELECT_COLUMNS
    ))
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_student).transpose()
}

/// Load a student by external identifier
pub async fn find_by_external_id(pool: &SqlitePool, student_id: &str) -> Result<Option<Student>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM students WHERE student_id = ?",
        SELECT_COLUMNS
    ))
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_student).transpose()
}

/// List students, optionally filtered, sorted by name.
///
/// `name` matches case-insensitively against the display name OR the
/// external identifier; `student_id` matches the external identifier only.
pub async fn list_students(
    pool: &SqlitePool,
    name: Option<&str>,
    year: Option<YearLevel>,
    student_id: Option<&str>,
) -> Result<Vec<Student>> {
    let mut sql = format!("SELECT {} FROM students WHERE 1=1", SELECT_COLUMNS);
    if name.is_some() {
        sql.push_str(
            " AND (name LIKE '%' || ? || '%' COLLATE NOCASE \
             OR student_id LIKE '%' || ? || '%' COLLATE NOCASE)",
        );
    }
    if year.is_some() {
        sql.push_str(" AND year = ?");
    }
    if student_id.is_some() {
        sql.push_str(" AND student_id LIKE '%' || ? || '%' COLLATE NOCASE");
    }
    sql.push_str(" ORDER BY name ASC");

    let mut query = sqlx::query(&sql);
    if let Some(n) = name {
        query = query.bind(n).bind(n);
    }
    if let Some(y) = year {
        query = query.bind(y.as_str());
    }
    if let Some(id) = student_id {
        query = query.bind(id);
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_student).collect()
}

/// List students matching a display-name substring only, optionally
/// filtered by year; sorted by name. Unlike `list_students`, the name
/// filter never matches the external identifier. Backs the chat student
/// query, which searches by name alone.
pub async fn search_by_name(
    pool: &SqlitePool,
    name: Option<&str>,
    year: Option<YearLevel>,
) -> Result<Vec<Student>> {
    let mut sql = format!("SELECT {} FROM students WHERE 1=1", SELECT_COLUMNS);
    if name.is_some() {
        sql.push_str(" AND name LIKE '%' || ? || '%' COLLATE NOCASE");
    }
    if year.is_some() {
        sql.push_str(" AND year = ?");
    }
    sql.push_str(" ORDER BY name ASC");

    let mut query = sqlx::query(&sql);
    if let Some(n) = name {
        query = query.bind(n);
    }
    if let Some(y) = year {
        query = query.bind(y.as_str());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(row_to_student).collect()
}

/// Apply a partial patch; returns None when the student does not exist
pub async fn update_student(
    pool: &SqlitePool,
    guid: Uuid,
    patch: &StudentPatch,
) -> Result<Option<Student>> {
    let Some(existing) = get_student(pool, guid).await? else {
        return Ok(None);
    };

    let name = patch.name.clone().unwrap_or(existing.name);
    let sex = patch.sex.unwrap_or(existing.sex);
    let year = patch.year.unwrap_or(existing.year);
    let student_id = patch.student_id.clone().or(existing.student_id);
    let date_of_birth = patch.date_of_birth.or(existing.date_of_birth);
    let email = patch.email.clone().or(existing.email);
    let phone = patch.phone.clone().or(existing.phone);
    let address = patch.address.clone().or(existing.address);

    sqlx::query(
        r#"
        UPDATE students SET
            student_id = ?, name = ?, sex = ?, year = ?, date_of_birth = ?,
            email = ?, phone = ?, address = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&student_id)
    .bind(&name)
    .bind(sex.as_str())
    .bind(year.as_str())
    .bind(date_of_birth)
    .bind(&email)
    .bind(&phone)
    .bind(&address)
    .bind(guid.to_string())
    .execute(pool)
    .await?;

    get_student(pool, guid).await
}

/// Delete a student; returns true when a row was removed.
///
/// Attendance records referencing the student are left in place
/// (orphaned but inert; the student reference simply stops resolving).
pub async fn delete_student(pool: &SqlitePool, guid: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM students WHERE guid = ?")
        .bind(guid.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Total student count (denominator basis for attendance rates)
pub async fn count_students(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
