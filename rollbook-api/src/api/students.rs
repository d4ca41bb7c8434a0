//! Student CRUD and bulk import endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rollbook_common::types::{Sex, YearLevel};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{self, students};
use crate::db::students::{NewStudent, StudentPatch};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Treat empty / whitespace-only optional fields as "no value" so they
/// never collide on the sparse uniqueness constraint.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_guid(id: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid student reference: {}", id)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub name: Option<String>,
    pub year: Option<YearLevel>,
    #[serde(rename = "studentId")]
    pub student_id: Option<String>,
}

/// GET /api/students
pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let found = students::list_students(
        &state.db,
        query.name.as_deref(),
        query.year,
        query.student_id.as_deref(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "count": found.len(),
        "data": found,
    })))
}

/// GET /api/students/:id
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let guid = parse_guid(&id)?;
    let student = students::get_student(&state.db, guid)
        .await?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": student,
    })))
}

/// POST /api/students body
#[derive(Debug, Deserialize)]
pub struct CreateStudentRequest {
    pub name: String,
    pub sex: Sex,
    pub year: YearLevel,
    #[serde(rename = "studentId", default)]
    pub student_id: Option<String>,
    #[serde(rename = "dateOfBirth", default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// POST /api/students
pub async fn create_student(
    State(state): State<AppState>,
    Json(request): Json<CreateStudentRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation(vec![
            "Student name is required".to_string(),
        ]));
    }

    let date_of_birth = blank_to_none(request.date_of_birth)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest(format!("Invalid date of birth: {}", s)))
        })
        .transpose()?;

    let new = NewStudent {
        name,
        sex: request.sex,
        year: request.year,
        student_id: blank_to_none(request.student_id),
        date_of_birth,
        email: blank_to_none(request.email).map(|s| s.to_lowercase()),
        phone: blank_to_none(request.phone),
        address: blank_to_none(request.address),
    };

    let student = match students::insert_student(&state.db, &new).await {
        Ok(student) => student,
        Err(err) if db::is_unique_violation(&err) => {
            return Err(ApiError::Conflict("Student ID already exists".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Student created successfully",
            "data": student,
        })),
    ))
}

/// PUT /api/students/:id
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut patch): Json<StudentPatch>,
) -> ApiResult<impl IntoResponse> {
    let guid = parse_guid(&id)?;

    // Same normalization as the create path: blank optional fields are
    // "no value", so an empty studentId never lands on the sparse
    // uniqueness constraint.
    if let Some(name) = patch.name.take() {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::Validation(vec![
                "Student name is required".to_string(),
            ]));
        }
        patch.name = Some(name);
    }
    patch.student_id = blank_to_none(patch.student_id);
    patch.email = blank_to_none(patch.email).map(|s| s.to_lowercase());
    patch.phone = blank_to_none(patch.phone);
    patch.address = blank_to_none(patch.address);

    let student = match students::update_student(&state.db, guid, &patch).await {
        Ok(Some(student)) => student,
        Ok(None) => return Err(ApiError::NotFound("Student not found".to_string())),
        Err(err) if db::is_unique_violation(&err) => {
            return Err(ApiError::Conflict("Student ID already exists".to_string()));
        }
        Err(err) => return Err(err.into()),
    };

    Ok(Json(json!({
        "success": true,
        "message": "Student updated successfully",
        "data": student,
    })))
}

/// DELETE /api/students/:id
///
/// The student's attendance records are left in place (orphaned but
/// inert), per the documented deletion policy.
pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let guid = parse_guid(&id)?;

    if !students::delete_student(&state.db, guid).await? {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Student deleted successfully",
    })))
}

/// One loosely-typed row of a bulk import; validated per row so a bad
/// row is reported and skipped instead of failing the whole import.
#[derive(Debug, Deserialize)]
pub struct ImportStudent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(rename = "studentId", default)]
    pub student_id: Option<String>,
    #[serde(rename = "dateOfBirth", default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    #[serde(default)]
    pub students: Vec<ImportStudent>,
}

fn validate_import_row(index: usize, row: &ImportStudent) -> Result<NewStudent, String> {
    let row_num = index + 1;

    let name = row
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Student {}: Name is required", row_num))?;

    let sex = row
        .sex
        .as_deref()
        .and_then(|s| s.parse::<Sex>().ok())
        .ok_or_else(|| {
            format!(
                "Student {} ({}): Sex must be either 'Male' or 'Female'",
                row_num, name
            )
        })?;

    let year = row
        .year
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Student {} ({}): Year is required", row_num, name))?
        .parse::<YearLevel>()
        .map_err(|_| format!("Student {} ({}): Invalid year level", row_num, name))?;

    let date_of_birth = match blank_to_none(row.date_of_birth.clone()) {
        Some(s) => Some(
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| format!("Student {} ({}): Invalid date of birth", row_num, name))?,
        ),
        None => None,
    };

    Ok(NewStudent {
        name: name.to_string(),
        sex,
        year,
        student_id: blank_to_none(row.student_id.clone()),
        date_of_birth,
        email: blank_to_none(row.email.clone()).map(|s| s.to_lowercase()),
        phone: blank_to_none(row.phone.clone()),
        address: blank_to_none(row.address.clone()),
    })
}

/// POST /api/students/bulk-import
///
/// Rows are inserted one-by-one so duplicate external ids fail
/// independently; the response separates validation failures from
/// duplicate rejections.
pub async fn bulk_import_students(
    State(state): State<AppState>,
    Json(request): Json<BulkImportRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.students.is_empty() {
        return Err(ApiError::BadRequest(
            "Invalid students data. Expected an array of students.".to_string(),
        ));
    }

    let mut cleaned = Vec::new();
    let mut validation_errors = Vec::new();
    for (index, row) in request.students.iter().enumerate() {
        match validate_import_row(index, row) {
            Ok(new) => cleaned.push(new),
            Err(message) => validation_errors.push(message),
        }
    }

    if cleaned.is_empty() {
        let mut body = json!({
            "success": false,
            "message": "No valid students to import",
        });
        body["errors"] = json!(validation_errors);
        return Ok((StatusCode::BAD_REQUEST, Json(body)));
    }

    let mut inserted = 0usize;
    let mut duplicate_errors = Vec::new();
    for new in &cleaned {
        match students::insert_student(&state.db, new).await {
            Ok(_) => inserted += 1,
            Err(err) if db::is_unique_violation(&err) => {
                duplicate_errors.push(format!("{} - Student ID already exists", new.name));
            }
            Err(err) => return Err(err.into()),
        }
    }

    let failed = cleaned.len() - inserted;
    let plural = |n: usize| if n == 1 { "" } else { "s" };

    if failed > 0 {
        let mut data = json!({
            "inserted": inserted,
            "failed": failed,
            "duplicateErrors": duplicate_errors,
        });
        if !validation_errors.is_empty() {
            data["validationErrors"] = json!(validation_errors);
        }
        return Ok((
            StatusCode::MULTI_STATUS,
            Json(json!({
                "success": true,
                "message": format!(
                    "Imported {} student{}. {} failed due to duplicates.",
                    inserted,
                    plural(inserted),
                    failed
                ),
                "data": data,
            })),
        ));
    }

    let mut data = json!({
        "inserted": inserted,
        "failed": validation_errors.len(),
    });
    if !validation_errors.is_empty() {
        data["validationErrors"] = json!(validation_errors);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Successfully imported {} student{}", inserted, plural(inserted)),
            "data": data,
        })),
    ))
}

/// Build student routes. The bulk-import route is registered before the
/// parameterized routes so "bulk-import" never parses as a student id.
pub fn student_routes() -> Router<AppState> {
    Router::new()
        .route("/api/students/bulk-import", post(bulk_import_students))
        .route("/api/students", get(list_students).post(create_student))
        .route(
            "/api/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
}
