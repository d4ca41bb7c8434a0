//! Attendance endpoints: single and batch writes, day/student reads,
//! aggregate statistics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rollbook_common::types::{AttendanceStatus, YearLevel};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{attendance, students};
use crate::error::{ApiError, ApiResult};
use crate::services::reconciler::{self, BatchEntry, WriteAction};
use crate::services::stats;
use crate::AppState;

/// POST /api/attendance body
#[derive(Debug, Deserialize)]
pub struct RecordRequest {
    /// Student external identifier
    #[serde(rename = "studentId")]
    pub student_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /api/attendance
///
/// Creates or overwrites one day's record for a student; 201 on create,
/// 200 on in-place update.
pub async fn record_attendance(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> ApiResult<impl IntoResponse> {
    let day = reconciler::normalize_day(&request.date)?;

    let (record, action) = reconciler::record_single(
        &state.db,
        &request.student_id,
        day,
        request.status,
        request.reason,
        request.notes,
    )
    .await?;

    let (status, message) = match action {
        WriteAction::Created => (StatusCode::CREATED, "Attendance recorded successfully"),
        WriteAction::Updated => (StatusCode::OK, "Attendance updated successfully"),
    };

    Ok((
        status,
        Json(json!({
            "success": true,
            "message": message,
            "data": record,
        })),
    ))
}

/// POST /api/attendance/bulk body
#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(rename = "attendanceRecords", default)]
    pub attendance_records: Vec<BatchEntry>,
}

/// POST /api/attendance/bulk
///
/// Partial-failure policy: the call succeeds as long as it ran to
/// completion; callers inspect `errors` to detect per-entry failures.
pub async fn bulk_record_attendance(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.attendance_records.is_empty() {
        return Err(ApiError::BadRequest(
            "Invalid attendance data. Expected an array of records.".to_string(),
        ));
    }

    let report = reconciler::record_batch(&state.db, &request.attendance_records).await;

    let mut body = json!({
        "success": true,
        "message": format!("{} attendance records processed", report.results.len()),
        "data": report.results,
    });
    if !report.errors.is_empty() {
        body["errors"] = json!(report.errors);
    }

    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub year: Option<YearLevel>,
}

/// GET /api/attendance/date/:date
///
/// All records for one calendar day, joined to students. The optional
/// year filter applies to the joined student, after the day selection.
pub async fn attendance_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<DateQuery>,
) -> ApiResult<impl IntoResponse> {
    let day = reconciler::normalize_day(&date)?;

    let mut records = attendance::list_for_day(&state.db, day).await?;
    if let Some(year) = query.year {
        records.retain(|r| r.student.as_ref().is_some_and(|s| s.year == year));
    }

    Ok(Json(json!({
        "success": true,
        "count": records.len(),
        "data": records,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StudentRangeQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// GET /api/attendance/student/:id
///
/// One student's records, newest first. The date range applies only when
/// both bounds are given.
pub async fn attendance_by_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StudentRangeQuery>,
) -> ApiResult<impl IntoResponse> {
    let guid = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid student reference: {}", id)))?;

    if students::get_student(&state.db, guid).await?.is_none() {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }

    let range = match (&query.start_date, &query.end_date) {
        (Some(start), Some(end)) => Some((
            reconciler::normalize_day(start)?,
            reconciler::normalize_day(end)?,
        )),
        _ => None,
    };

    let records = attendance::list_for_student(&state.db, guid, range).await?;

    Ok(Json(json!({
        "success": true,
        "count": records.len(),
        "data": records,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub year: Option<YearLevel>,
}

/// GET /api/attendance/stats
pub async fn attendance_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<impl IntoResponse> {
    let range = match (&query.start_date, &query.end_date) {
        (Some(start), Some(end)) => Some((
            reconciler::normalize_day(start)?,
            reconciler::normalize_day(end)?,
        )),
        _ => None,
    };

    let counts = stats::status_counts(&state.db, range, query.year).await?;

    Ok(Json(json!({
        "success": true,
        "data": counts,
    })))
}

/// Build attendance routes
pub fn attendance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/attendance", post(record_attendance))
        .route("/api/attendance/bulk", post(bulk_record_attendance))
        .route("/api/attendance/date/:date", get(attendance_by_date))
        .route("/api/attendance/student/:id", get(attendance_by_student))
        .route("/api/attendance/stats", get(attendance_stats))
}
