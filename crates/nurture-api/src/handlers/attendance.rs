//! Daily attendance marking and per-month reports.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nurture_core::types::{AttendanceCode, AttendanceSummary, Month, MonthlyAttendance};
use nurture_storage::AttendanceMark;

use super::{find_student, parse_date, present};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub student_id: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub student_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAttendanceRequest {
    pub date: Option<String>,
    #[serde(default)]
    pub entries: Vec<BulkEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub year: Option<i32>,
    pub month: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkResult {
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceCode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReport {
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub educator: Option<Uuid>,
    pub report: Vec<MonthlyAttendance>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceOverview {
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub months: Vec<AttendanceSummary>,
    pub total_present: u32,
    pub total_absent: u32,
    /// Present over marked days across all months.
    pub percentage: Option<f64>,
}

/// Only `P` and `A` can be set by staff; `$` is the unmarked filler.
fn parse_code(status: Option<&str>) -> Result<AttendanceCode, ApiError> {
    let mut chars = status.unwrap_or_default().trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => match AttendanceCode::from_char(c.to_ascii_uppercase()) {
            Some(code @ (AttendanceCode::Present | AttendanceCode::Absent)) => Ok(code),
            _ => Err(invalid_status()),
        },
        _ => Err(invalid_status()),
    }
}

fn invalid_status() -> ApiError {
    ApiError::BadRequest("Attendance status must be 'P' or 'A'".to_string())
}

fn parse_mark_date(date: Option<&str>) -> Result<NaiveDate, ApiError> {
    let date = date
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Date is required".to_string()))?;
    let date = parse_date("date", date)?;
    if date > Utc::now().date_naive() {
        return Err(ApiError::BadRequest(
            "Cannot mark attendance for a future date".to_string(),
        ));
    }
    Ok(date)
}

/// POST /api/v1/attendance/mark
pub async fn mark(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<MarkAttendanceRequest>, JsonRejection>,
) -> Result<ApiResponse<MarkResult>, ApiError> {
    let Json(req) = payload?;
    let student_id = present(&req.student_id)
        .ok_or_else(|| ApiError::BadRequest("Student ID is required".to_string()))?;
    let date = parse_mark_date(req.date.as_deref())?;
    let code = parse_code(req.status.as_deref())?;
    let student = find_student(&state, student_id)?;

    state.attendance.mark(&AttendanceMark {
        student: student.id,
        date,
        code,
        educator: Some(user.id),
    })?;
    tracing::debug!(student_id = %student.student_id, %date, "Attendance marked");

    Ok(ApiResponse::ok(
        MarkResult {
            student_id: student.student_id,
            date,
            status: code,
        },
        "Attendance marked successfully",
    ))
}

/// POST /api/v1/attendance/bulk
///
/// Every entry is validated before anything is written; the writes then
/// happen in one transaction.
pub async fn bulk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<BulkAttendanceRequest>, JsonRejection>,
) -> Result<ApiResponse<Vec<MarkResult>>, ApiError> {
    let Json(req) = payload?;
    let date = parse_mark_date(req.date.as_deref())?;
    if req.entries.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one attendance entry is required".to_string(),
        ));
    }

    let mut marks = Vec::with_capacity(req.entries.len());
    let mut results = Vec::with_capacity(req.entries.len());
    for entry in &req.entries {
        let student_id = present(&entry.student_id)
            .ok_or_else(|| ApiError::BadRequest("Student ID is required".to_string()))?;
        let code = parse_code(entry.status.as_deref())?;
        let student = find_student(&state, student_id)?;
        marks.push(AttendanceMark {
            student: student.id,
            date,
            code,
            educator: Some(user.id),
        });
        results.push(MarkResult {
            student_id: student.student_id,
            date,
            status: code,
        });
    }

    state.attendance.apply_marks(&marks)?;
    tracing::info!(count = marks.len(), %date, "Bulk attendance recorded");
    Ok(ApiResponse::ok(results, "Attendance marked successfully"))
}

/// GET /api/v1/attendance/{student_id}
pub async fn report(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<String>,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> Result<ApiResponse<AttendanceReport>, ApiError> {
    let Query(params) = params?;
    let student = find_student(&state, &student_id)?;
    user.ensure_self_or_staff(student.id)?;

    let month = params
        .month
        .as_deref()
        .map(parse_month)
        .transpose()?;
    let record = state.attendance.find_by_student(student.id)?;
    let (educator, months) = match record {
        Some(record) => (record.educator, record.report),
        None => (None, Vec::new()),
    };
    let report = months
        .into_iter()
        .filter(|m| params.year.map_or(true, |y| m.year == y))
        .filter(|m| month.map_or(true, |mo| m.month == mo))
        .collect();

    Ok(ApiResponse::ok(
        AttendanceReport {
            student_id: student.student_id,
            educator,
            report,
        },
        "Attendance fetched successfully",
    ))
}

/// Month by abbreviation (`Mar`) or number (`3`).
fn parse_month(value: &str) -> Result<Month, ApiError> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u32>() {
        return Month::from_number(n)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid month '{}'", value)));
    }
    Ok(value.parse::<Month>()?)
}

/// GET /api/v1/attendance/{student_id}/summary
pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<String>,
) -> Result<ApiResponse<AttendanceOverview>, ApiError> {
    let student = find_student(&state, &student_id)?;
    user.ensure_self_or_staff(student.id)?;

    let months = state
        .attendance
        .find_by_student(student.id)?
        .map(|r| r.summaries())
        .unwrap_or_default();
    let total_present: u32 = months.iter().map(|m| m.present).sum();
    let total_absent: u32 = months.iter().map(|m| m.absent).sum();
    let marked = total_present + total_absent;
    let percentage = (marked > 0).then(|| total_present as f64 * 100.0 / marked as f64);

    Ok(ApiResponse::ok(
        AttendanceOverview {
            student_id: student.student_id,
            months,
            total_present,
            total_absent,
            percentage,
        },
        "Attendance summary fetched successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountRole;
    use crate::handlers::test_support::*;
    use crate::routes::create_router;
    use axum::http::StatusCode;
    use nurture_core::types::Role;
    use tower::ServiceExt;

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code(Some("P")).unwrap(), AttendanceCode::Present);
        assert_eq!(parse_code(Some(" a ")).unwrap(), AttendanceCode::Absent);
        assert!(parse_code(Some("$")).is_err());
        assert!(parse_code(Some("PA")).is_err());
        assert!(parse_code(None).is_err());
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("3").unwrap(), Month::Mar);
        assert_eq!(parse_month("dec").unwrap(), Month::Dec);
        assert!(parse_month("13").is_err());
        assert!(parse_month("Smarch").is_err());
    }

    #[tokio::test]
    async fn test_future_date_rejected() {
        let state = make_state();
        let educator = seed_employee(&state, "edu@example.com", Role::Educator).await;
        let student = seed_student(&state, "kid@example.com", true).await;
        let auth = bearer(&state, educator.id, AccountRole::Educator);
        let app = create_router(state);

        let tomorrow = Utc::now().date_naive().succ_opt().unwrap();
        let body = format!(
            r#"{{"studentId": "{}", "date": "{}", "status": "P"}}"#,
            student.student_id, tomorrow
        );
        let resp = app
            .oneshot(json_request("POST", "/api/v1/attendance/mark", Some(&auth), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mark_and_summarize() {
        let state = make_state();
        let educator = seed_employee(&state, "edu@example.com", Role::Educator).await;
        let student = seed_student(&state, "kid@example.com", true).await;
        let auth = bearer(&state, educator.id, AccountRole::Educator);
        let app = create_router(state.clone());

        for (day, status) in [("2024-02-01", "P"), ("2024-02-02", "P"), ("2024-02-05", "A")] {
            let body = format!(
                r#"{{"studentId": "{}", "date": "{}", "status": "{}"}}"#,
                student.student_id, day, status
            );
            let resp = app
                .clone()
                .oneshot(json_request("POST", "/api/v1/attendance/mark", Some(&auth), &body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let record = state.attendance.find_by_student(student.id).unwrap().unwrap();
        assert_eq!(record.educator, Some(educator.id));
        assert_eq!(record.report.len(), 1);
        assert_eq!(record.report[0].status.len(), 29);

        let student_auth = bearer(&state, student.id, AccountRole::Student);
        let resp = app
            .clone()
            .oneshot(get_request(
                &format!("/api/v1/attendance/{}/summary", student.student_id),
                Some(&student_auth),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let feb = &json["data"]["months"][0];
        assert_eq!(feb["month"], "Feb");
        assert_eq!(feb["present"], 2);
        assert_eq!(feb["absent"], 1);
        assert_eq!(feb["unmarked"], 26);
        let pct = json["data"]["percentage"].as_f64().unwrap();
        assert!((pct - 66.666).abs() < 0.01);

        let resp = app
            .oneshot(get_request(
                &format!("/api/v1/attendance/{}?year=2024&month=Mar", student.student_id),
                Some(&student_auth),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["data"]["report"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_other_student_cannot_read_attendance() {
        let state = make_state();
        let student = seed_student(&state, "kid@example.com", true).await;
        let other = seed_student(&state, "other@example.com", true).await;
        let auth = bearer(&state, other.id, AccountRole::Student);
        let app = create_router(state);

        let resp = app
            .oneshot(get_request(
                &format!("/api/v1/attendance/{}", student.student_id),
                Some(&auth),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_bulk_unknown_student_writes_nothing() {
        let state = make_state();
        let educator = seed_employee(&state, "edu@example.com", Role::Educator).await;
        let student = seed_student(&state, "kid@example.com", true).await;
        let auth = bearer(&state, educator.id, AccountRole::Educator);
        let app = create_router(state.clone());

        let body = format!(
            r#"{{"date": "2024-03-04", "entries": [
                {{"studentId": "{}", "status": "P"}},
                {{"studentId": "STU0", "status": "A"}}
            ]}}"#,
            student.student_id
        );
        let resp = app
            .oneshot(json_request("POST", "/api/v1/attendance/bulk", Some(&auth), &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(state.attendance.find_by_student(student.id).unwrap().is_none());
    }
}
