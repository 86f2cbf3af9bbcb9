//! Written progress reports about students.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Extension, Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nurture_core::types::{EducatorSummary, GuardianDetails, Program, Student, StudentReport};

use super::{find_student, present};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub student_id: Option<String>,
    pub program_feedback: Option<String>,
    pub feedback: Option<String>,
    pub assessment_report: Option<String>,
}

/// The student fields shown alongside a report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStudent {
    pub id: Uuid,
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub programs: Vec<Program>,
    pub primary_diagnosis: String,
    pub guardian_details: GuardianDetails,
}

impl From<&Student> for ReportStudent {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id,
            student_id: s.student_id.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            programs: s.programs.clone(),
            primary_diagnosis: s.primary_diagnosis.clone(),
            guardian_details: s.guardian_details.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: Uuid,
    pub student: ReportStudent,
    pub author: Option<EducatorSummary>,
    pub program_feedback: Option<String>,
    pub feedback: String,
    pub assessment_report: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn to_view(
    state: &AppState,
    report: StudentReport,
    student: &Student,
) -> Result<ReportView, ApiError> {
    let author = match report.author {
        Some(id) => state.employees.find_by_id(id)?.as_ref().map(EducatorSummary::from),
        None => None,
    };
    Ok(ReportView {
        id: report.id,
        student: ReportStudent::from(student),
        author,
        program_feedback: report.program_feedback,
        feedback: report.feedback,
        assessment_report: report.assessment_report,
        created_at: report.created_at,
    })
}

/// POST /api/v1/reports
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateReportRequest>, JsonRejection>,
) -> Result<ApiResponse<ReportView>, ApiError> {
    let Json(req) = payload?;
    let missing =
        || ApiError::BadRequest("Missing required fields for student report.".to_string());
    let student_id = present(&req.student_id).ok_or_else(missing)?;
    let feedback = present(&req.feedback).ok_or_else(missing)?;

    let student = state
        .students
        .find_by_student_id(student_id)?
        .ok_or_else(|| ApiError::NotFound("Student not found.".to_string()))?;

    let report = StudentReport {
        id: Uuid::new_v4(),
        student: student.id,
        author: Some(user.id),
        program_feedback: present(&req.program_feedback).map(str::to_string),
        feedback: feedback.to_string(),
        assessment_report: present(&req.assessment_report).map(str::to_string),
        created_at: Utc::now(),
    };
    state.reports.insert(&report)?;
    tracing::info!(
        student_id = %student.student_id,
        report = %report.id,
        "Student report created"
    );

    let view = to_view(&state, report, &student)?;
    Ok(ApiResponse::created(view, "Student report generated successfully."))
}

/// GET /api/v1/reports/student/{student_id}
pub async fn list_for_student(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<String>,
) -> Result<ApiResponse<Vec<ReportView>>, ApiError> {
    let student = find_student(&state, &student_id)?;
    user.ensure_self_or_staff(student.id)?;

    let views = state
        .reports
        .list_for_student(student.id)?
        .into_iter()
        .map(|report| to_view(&state, report, &student))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ApiResponse::ok(views, "Student reports fetched successfully"))
}

/// GET /api/v1/reports/{id}
pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<ApiResponse<ReportView>, ApiError> {
    let Path(id) = id?;
    let not_found = || ApiError::NotFound("Report not found".to_string());
    let report = state.reports.find_by_id(id)?.ok_or_else(not_found)?;
    user.ensure_self_or_staff(report.student)?;
    let student = state.students.find_by_id(report.student)?.ok_or_else(not_found)?;

    let view = to_view(&state, report, &student)?;
    Ok(ApiResponse::ok(view, "Student report fetched successfully"))
}
