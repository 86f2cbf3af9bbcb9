//! Student registration, sessions, profiles, media and approval.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use nurture_core::types::{
    AdminNotification, EducatorSummary, Employee, GuardianDetails, MediaAsset, MedicalHistory,
    Program, Role, SessionType, Student, StudentStatus, Udid,
};
use nurture_core::validate::{require_contact_number, require_email, require_password};
use nurture_storage::StudentFilter;

use super::session::{end_session, start_session, LoginRequest};
use super::{
    discard_upload, find_employee_by_any_id, find_student, parse_date, present,
    publish_notification, scalar_text,
};
use crate::auth::{hash_password, verify_password, AccountRole, AuthUser, TokenPair};
use crate::error::ApiError;
use crate::media::MultipartForm;
use crate::response::ApiResponse;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterStudentRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub student_email: Option<String>,
    pub password: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub primary_diagnosis: Option<String>,
    pub address: Option<String>,
    pub fathers_name: Option<String>,
    pub mothers_name: Option<String>,
    pub parent_email: Option<String>,
    /// Clients send this as a number or a string.
    pub contact_number: Option<Value>,
    pub comorbidity: Option<String>,
    pub allergies: Vec<String>,
    pub medical_history: MedicalHistory,
    pub guardian_details: GuardianDetails,
    pub number_of_sessions: Option<u32>,
    pub timings: Option<String>,
    pub days_of_week: Vec<String>,
    pub session_type: Option<SessionType>,
    pub transport: Option<bool>,
    pub preferred_language: Option<String>,
    pub enrollment_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub student_id: Option<String>,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveStudentRequest {
    pub student_id: Option<String>,
    #[serde(default)]
    pub educator_ids: Vec<String>,
    #[serde(default)]
    pub program_ids: Vec<String>,
}

/// Editable profile fields. Identity keys, credentials and the approval
/// flag are not listed, so sending them is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct StudentUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub primary_diagnosis: Option<String>,
    pub comorbidity: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub medical_history: Option<MedicalHistory>,
    pub address: Option<String>,
    pub fathers_name: Option<String>,
    pub mothers_name: Option<String>,
    pub parent_email: Option<String>,
    pub contact_number: Option<Value>,
    pub guardian_details: Option<GuardianDetails>,
    pub number_of_sessions: Option<u32>,
    pub timings: Option<String>,
    pub days_of_week: Option<Vec<String>>,
    pub session_type: Option<SessionType>,
    pub transport: Option<bool>,
    pub preferred_language: Option<String>,
    pub enrollment_year: Option<i32>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub comments: Option<String>,
    /// Staff only.
    pub status: Option<StudentStatus>,
    /// Staff only.
    pub programs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct StudentListParams {
    pub approved: Option<bool>,
    pub status: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct StudentSession {
    pub student: Student,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: MediaAsset,
}

#[derive(Debug, Serialize)]
pub struct AssignedEducators {
    pub primary: Option<EducatorSummary>,
    pub secondary: Option<EducatorSummary>,
}

#[derive(Debug, Serialize)]
pub struct ApprovedStudent {
    #[serde(flatten)]
    pub student: Student,
    pub educators: AssignedEducators,
}

#[derive(Debug, Serialize)]
pub struct EducatorContact {
    pub name: String,
    pub designation: String,
    pub email: String,
}

impl From<&Employee> for EducatorContact {
    fn from(e: &Employee) -> Self {
        Self {
            name: e.name.clone(),
            designation: e.designation.clone(),
            email: e.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_email: String,
    pub gender: String,
    pub date_of_birth: NaiveDate,
    pub avatar: Option<MediaAsset>,
    #[serde(rename = "UDID")]
    pub udid: Udid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStatus {
    pub is_approved: bool,
    pub status: StudentStatus,
    pub enrollment_year: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfo {
    pub primary_diagnosis: String,
    pub comorbidity: Option<String>,
    pub allergies: Vec<String>,
    pub medical_history: MedicalHistory,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDetails {
    pub programs: Vec<Program>,
    pub number_of_sessions: Option<u32>,
    pub timings: Option<String>,
    pub days_of_week: Vec<String>,
    pub session_type: SessionType,
}

#[derive(Debug, Serialize)]
pub struct EducatorInfo {
    pub primary: Option<EducatorContact>,
    pub secondary: Option<EducatorContact>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub preferred_language: Option<String>,
    pub transport: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub educator: Option<String>,
    pub program_feedback: Option<String>,
    pub feedback: String,
    pub assessment_report: Option<String>,
}

/// The sectioned profile document shown in the apps.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub basic_info: BasicInfo,
    pub enrollment_status: EnrollmentStatus,
    pub medical_info: MedicalInfo,
    pub program_details: ProgramDetails,
    pub educator_info: EducatorInfo,
    pub guardian_details: GuardianDetails,
    pub preferences: Preferences,
    pub address: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub comments: Option<String>,
    pub progress_reports: Vec<ProgressReport>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/students/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterStudentRequest>, JsonRejection>,
) -> Result<ApiResponse<Student>, ApiError> {
    let Json(req) = payload?;
    let missing = || ApiError::BadRequest("All required fields must be filled.".to_string());

    let first_name = present(&req.first_name).ok_or_else(missing)?;
    let last_name = present(&req.last_name).ok_or_else(missing)?;
    let student_email = present(&req.student_email).ok_or_else(missing)?;
    let password = req.password.as_deref().filter(|p| !p.is_empty()).ok_or_else(missing)?;
    let gender = present(&req.gender).ok_or_else(missing)?;
    let date_of_birth = present(&req.date_of_birth).ok_or_else(missing)?;
    let primary_diagnosis = present(&req.primary_diagnosis).ok_or_else(missing)?;
    let address = present(&req.address).ok_or_else(missing)?;
    let fathers_name = present(&req.fathers_name).ok_or_else(missing)?;
    let mothers_name = present(&req.mothers_name).ok_or_else(missing)?;
    let parent_email = present(&req.parent_email).ok_or_else(missing)?;
    let contact_number = scalar_text(&req.contact_number).ok_or_else(missing)?;

    let student_email = require_email("studentEmail", student_email)?;
    let parent_email = require_email("parentEmail", parent_email)?;
    require_password(password)?;
    let contact_number = require_contact_number(&contact_number)?;
    let date_of_birth = parse_date("dateOfBirth", date_of_birth)?;
    if date_of_birth > Utc::now().date_naive() {
        return Err(ApiError::BadRequest(
            "Date of birth cannot be in the future".to_string(),
        ));
    }

    if state.students.find_by_email(&student_email)?.is_some() {
        return Err(ApiError::Conflict(
            "Student with the same email or ID already exists.".to_string(),
        ));
    }

    let password_hash = hash_password(password, state.tokens.bcrypt_cost()).await?;
    let now = Utc::now();
    let student = Student {
        id: Uuid::new_v4(),
        student_id: nurture_core::ids::student_id(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        student_email,
        password_hash,
        gender: gender.to_string(),
        date_of_birth,
        primary_diagnosis: primary_diagnosis.to_string(),
        comorbidity: present(&req.comorbidity).map(str::to_string),
        allergies: req.allergies,
        medical_history: req.medical_history,
        address: address.to_string(),
        fathers_name: fathers_name.to_string(),
        mothers_name: mothers_name.to_string(),
        parent_email,
        contact_number,
        guardian_details: req.guardian_details,
        programs: Vec::new(),
        number_of_sessions: req.number_of_sessions,
        timings: req.timings,
        days_of_week: req.days_of_week,
        session_type: req.session_type.unwrap_or_default(),
        transport: req.transport.unwrap_or(false),
        preferred_language: req.preferred_language,
        status: StudentStatus::Active,
        is_approved: false,
        enrollment_year: req.enrollment_year,
        primary_educator: None,
        secondary_educator: None,
        avatar: None,
        udid: Udid::default(),
        strengths: Vec::new(),
        weaknesses: Vec::new(),
        comments: None,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };
    state.students.insert(&student)?;
    tracing::info!(student_id = %student.student_id, "Student registered");

    let notification = AdminNotification::student_registration(&student);
    match state.notifications.insert(&notification) {
        Ok(()) => publish_notification(&state, &notification),
        Err(e) => tracing::warn!(error = %e, "Failed to record registration notification"),
    }

    Ok(ApiResponse::created(student, "Student registered successfully"))
}

/// POST /api/v1/students/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<StudentSession>), ApiError> {
    let Json(req) = payload?;
    let (email, password) = req.credentials()?;
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let student = state.students.find_by_email(&email)?.ok_or_else(invalid)?;
    if !verify_password(password, &student.password_hash).await? {
        return Err(invalid());
    }
    if !student.is_approved {
        return Err(ApiError::Forbidden(
            "Please wait for admin approval before logging in.".to_string(),
        ));
    }

    let (jar, tokens) = start_session(&state, jar, student.id, AccountRole::Student)?;
    tracing::info!(student_id = %student.student_id, "Student logged in");
    Ok((
        jar,
        ApiResponse::ok(StudentSession { student, tokens }, "Student logged in successfully"),
    ))
}

/// POST /api/v1/students/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    user.ensure_student()?;
    if state.students.find_by_id(user.id)?.is_none() {
        return Err(ApiError::NotFound("Student not found".to_string()));
    }
    let jar = end_session(&state, jar, user.id, user.role)?;
    Ok((
        jar,
        ApiResponse::ok(Value::Object(Default::default()), "Student logged out successfully"),
    ))
}

/// GET /api/v1/students/profile
pub async fn my_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<ApiResponse<StudentProfile>, ApiError> {
    user.ensure_student()?;
    let student = state
        .students
        .find_by_id(user.id)?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    let profile = build_profile(&state, student)?;
    Ok(ApiResponse::ok(profile, "Profile fetched successfully"))
}

/// GET /api/v1/students/{student_id}/profile
pub async fn profile(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<ApiResponse<StudentProfile>, ApiError> {
    let student = find_student(&state, &student_id)?;
    let profile = build_profile(&state, student)?;
    Ok(ApiResponse::ok(profile, "Profile fetched successfully"))
}

fn build_profile(state: &AppState, student: Student) -> Result<StudentProfile, ApiError> {
    let contact = |id: Option<Uuid>| -> Result<Option<EducatorContact>, ApiError> {
        Ok(match id {
            Some(id) => state.employees.find_by_id(id)?.as_ref().map(EducatorContact::from),
            None => None,
        })
    };
    let educator_info = EducatorInfo {
        primary: contact(student.primary_educator)?,
        secondary: contact(student.secondary_educator)?,
    };

    let mut progress_reports = Vec::new();
    for report in state.reports.list_for_student(student.id)? {
        let educator = match report.author {
            Some(author) => state.employees.find_by_id(author)?.map(|e| e.name),
            None => None,
        };
        progress_reports.push(ProgressReport {
            id: report.id,
            date: report.created_at,
            educator,
            program_feedback: report.program_feedback,
            feedback: report.feedback,
            assessment_report: report.assessment_report,
        });
    }

    Ok(StudentProfile {
        basic_info: BasicInfo {
            student_id: student.student_id,
            first_name: student.first_name,
            last_name: student.last_name,
            student_email: student.student_email,
            gender: student.gender,
            date_of_birth: student.date_of_birth,
            avatar: student.avatar,
            udid: student.udid,
        },
        enrollment_status: EnrollmentStatus {
            is_approved: student.is_approved,
            status: student.status,
            enrollment_year: student.enrollment_year,
        },
        medical_info: MedicalInfo {
            primary_diagnosis: student.primary_diagnosis,
            comorbidity: student.comorbidity,
            allergies: student.allergies,
            medical_history: student.medical_history,
        },
        program_details: ProgramDetails {
            programs: student.programs,
            number_of_sessions: student.number_of_sessions,
            timings: student.timings,
            days_of_week: student.days_of_week,
            session_type: student.session_type,
        },
        educator_info,
        guardian_details: student.guardian_details,
        preferences: Preferences {
            preferred_language: student.preferred_language,
            transport: student.transport,
        },
        address: student.address,
        strengths: student.strengths,
        weaknesses: student.weaknesses,
        comments: student.comments,
        progress_reports,
    })
}

/// PUT /api/v1/students/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<ApiResponse<Value>, ApiError> {
    let Json(req) = payload?;
    let student_id = present(&req.student_id);
    let old_password = req.old_password.as_deref().filter(|p| !p.is_empty());
    let new_password = req.new_password.as_deref().filter(|p| !p.is_empty());
    let (Some(student_id), Some(old_password), Some(new_password)) =
        (student_id, old_password, new_password)
    else {
        return Err(ApiError::BadRequest(
            "Student ID, old password, and new password are required".to_string(),
        ));
    };

    let student = find_student(&state, student_id)?;
    user.ensure_self_or_staff(student.id)?;

    if !verify_password(old_password, &student.password_hash).await? {
        return Err(ApiError::Unauthorized("Old password is incorrect".to_string()));
    }
    if old_password == new_password {
        return Err(ApiError::BadRequest(
            "New password cannot be the same as the old password".to_string(),
        ));
    }
    require_password(new_password)?;

    let password_hash = hash_password(new_password, state.tokens.bcrypt_cost()).await?;
    state.students.set_password_hash(student.id, &password_hash)?;
    tracing::info!(student_id = %student.student_id, "Student password changed");
    Ok(ApiResponse::ok(
        Value::Object(Default::default()),
        "Password changed successfully",
    ))
}

/// PUT /api/v1/students/{student_id}
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<String>,
    payload: Result<Json<StudentUpdate>, JsonRejection>,
) -> Result<ApiResponse<Student>, ApiError> {
    let Json(changes) = payload?;
    let mut student = find_student(&state, &student_id)?;
    user.ensure_self_or_staff(student.id)?;
    if !user.role.is_staff() && (changes.status.is_some() || changes.programs.is_some()) {
        return Err(ApiError::Forbidden(
            "Only staff can change enrollment status or programs".to_string(),
        ));
    }

    apply_update(&mut student, changes)?;
    let student = state.students.update(&student)?;
    tracing::info!(student_id = %student.student_id, "Student profile updated");
    Ok(ApiResponse::ok(student, "Student updated successfully"))
}

fn apply_update(student: &mut Student, changes: StudentUpdate) -> Result<(), ApiError> {
    let required = |field: &str, value: &Option<String>| -> Result<Option<String>, ApiError> {
        match value {
            None => Ok(None),
            Some(v) if v.trim().is_empty() => {
                Err(ApiError::BadRequest(format!("'{}' cannot be empty", field)))
            }
            Some(v) => Ok(Some(v.trim().to_string())),
        }
    };

    if let Some(v) = required("firstName", &changes.first_name)? {
        student.first_name = v;
    }
    if let Some(v) = required("lastName", &changes.last_name)? {
        student.last_name = v;
    }
    if let Some(v) = required("gender", &changes.gender)? {
        student.gender = v;
    }
    if let Some(v) = required("dateOfBirth", &changes.date_of_birth)? {
        student.date_of_birth = parse_date("dateOfBirth", &v)?;
    }
    if let Some(v) = required("primaryDiagnosis", &changes.primary_diagnosis)? {
        student.primary_diagnosis = v;
    }
    if let Some(v) = required("address", &changes.address)? {
        student.address = v;
    }
    if let Some(v) = required("fathersName", &changes.fathers_name)? {
        student.fathers_name = v;
    }
    if let Some(v) = required("mothersName", &changes.mothers_name)? {
        student.mothers_name = v;
    }
    if let Some(v) = required("parentEmail", &changes.parent_email)? {
        student.parent_email = require_email("parentEmail", &v)?;
    }
    if changes.contact_number.is_some() {
        let number = scalar_text(&changes.contact_number).ok_or_else(|| {
            ApiError::BadRequest("'contactNumber' cannot be empty".to_string())
        })?;
        student.contact_number = require_contact_number(&number)?;
    }
    if let Some(programs) = changes.programs {
        student.programs = parse_programs(&programs)?;
    }

    if changes.comorbidity.is_some() {
        student.comorbidity = present(&changes.comorbidity).map(str::to_string);
    }
    if let Some(v) = changes.allergies {
        student.allergies = v;
    }
    if let Some(v) = changes.medical_history {
        student.medical_history = v;
    }
    if let Some(v) = changes.guardian_details {
        student.guardian_details = v;
    }
    if let Some(v) = changes.number_of_sessions {
        student.number_of_sessions = Some(v);
    }
    if changes.timings.is_some() {
        student.timings = changes.timings;
    }
    if let Some(v) = changes.days_of_week {
        student.days_of_week = v;
    }
    if let Some(v) = changes.session_type {
        student.session_type = v;
    }
    if let Some(v) = changes.transport {
        student.transport = v;
    }
    if changes.preferred_language.is_some() {
        student.preferred_language = changes.preferred_language;
    }
    if let Some(v) = changes.enrollment_year {
        student.enrollment_year = Some(v);
    }
    if let Some(v) = changes.strengths {
        student.strengths = v;
    }
    if let Some(v) = changes.weaknesses {
        student.weaknesses = v;
    }
    if changes.comments.is_some() {
        student.comments = changes.comments;
    }
    if let Some(v) = changes.status {
        student.status = v;
    }
    Ok(())
}

/// Parse program names, reporting every unknown one at once.
fn parse_programs(names: &[String]) -> Result<Vec<Program>, ApiError> {
    let mut programs = Vec::with_capacity(names.len());
    let mut invalid = Vec::new();
    for name in names {
        match name.trim().parse::<Program>() {
            Ok(p) if !programs.contains(&p) => programs.push(p),
            Ok(_) => {}
            Err(_) => invalid.push(name.as_str()),
        }
    }
    if !invalid.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid program(s): {}",
            invalid.join(", ")
        )));
    }
    Ok(programs)
}

/// POST /api/v1/students/avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<AvatarResponse>, ApiError> {
    user.ensure_student()?;
    let mut form = MultipartForm::read(multipart, state.config.media.max_upload_bytes).await?;
    let file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::BadRequest("Please upload avatar file".to_string()))?;
    file.ensure_allowed_type()?;

    let mut student = state
        .students
        .find_by_id(user.id)?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;

    let asset = state.media.upload(&file).await?;
    let previous = student.avatar.replace(asset.clone());
    if let Err(e) = state.students.update(&student) {
        discard_upload(&state, &asset.public_id).await;
        return Err(e.into());
    }

    if let Some(previous) = previous {
        if let Err(e) = state.media.delete(&previous.public_id).await {
            tracing::warn!(public_id = %previous.public_id, error = %e, "Failed to delete old avatar");
        }
    }

    Ok(ApiResponse::ok(
        AvatarResponse { avatar: asset },
        "Avatar uploaded successfully",
    ))
}

/// POST /api/v1/students/{student_id}/udid
pub async fn upload_udid(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(student_id): Path<String>,
    multipart: Multipart,
) -> Result<ApiResponse<Udid>, ApiError> {
    let mut student = find_student(&state, &student_id)?;
    user.ensure_self_or_staff(student.id)?;

    let mut form = MultipartForm::read(multipart, state.config.media.max_upload_bytes).await?;
    let file = form
        .take_file("udid")
        .ok_or_else(|| ApiError::BadRequest("Please upload UDID file".to_string()))?;
    file.ensure_allowed_type()?;

    let asset = state.media.upload(&file).await?;
    let uploaded = asset.public_id.clone();
    let previous = std::mem::replace(
        &mut student.udid,
        Udid {
            is_available: true,
            public_id: asset.public_id,
            secure_url: asset.secure_url,
        },
    );
    let student = match state.students.update(&student) {
        Ok(student) => student,
        Err(e) => {
            discard_upload(&state, &uploaded).await;
            return Err(e.into());
        }
    };

    if !previous.public_id.is_empty() {
        if let Err(e) = state.media.delete(&previous.public_id).await {
            tracing::warn!(public_id = %previous.public_id, error = %e, "Failed to delete old UDID document");
        }
    }

    Ok(ApiResponse::ok(student.udid, "UDID uploaded successfully"))
}

/// GET /api/v1/students
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<StudentListParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<Student>>, ApiError> {
    let Query(params) = params?;
    let filter = StudentFilter {
        approved: params.approved,
        status: params
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<StudentStatus>)
            .transpose()?,
    };
    let students = state.students.list(&filter)?;
    Ok(ApiResponse::ok(students, "Students fetched successfully"))
}

/// POST /api/v1/students/approve
pub async fn approve(
    State(state): State<AppState>,
    payload: Result<Json<ApproveStudentRequest>, JsonRejection>,
) -> Result<ApiResponse<ApprovedStudent>, ApiError> {
    let Json(req) = payload?;
    let student_id = present(&req.student_id)
        .ok_or_else(|| ApiError::BadRequest("Student ID is required".to_string()))?;
    if req.educator_ids.len() != 2 {
        return Err(ApiError::BadRequest(
            "Two educators (primary and secondary) must be assigned".to_string(),
        ));
    }
    if req.program_ids.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one program must be assigned".to_string(),
        ));
    }
    let programs = parse_programs(&req.program_ids)?;

    let primary = find_educator(&state, &req.educator_ids[0])?;
    let secondary = find_educator(&state, &req.educator_ids[1])?;
    if primary.id == secondary.id {
        return Err(ApiError::BadRequest(
            "Primary and secondary educators must be different".to_string(),
        ));
    }

    let mut student = find_student(&state, student_id)?;
    if student.is_approved {
        return Err(ApiError::BadRequest("Student is already approved".to_string()));
    }

    student.is_approved = true;
    student.status = StudentStatus::Active;
    student.programs = programs;
    student.primary_educator = Some(primary.id);
    student.secondary_educator = Some(secondary.id);
    let student = state.students.update(&student)?;

    let marked = state.notifications.mark_registration_approved(student.id)?;
    tracing::info!(
        student_id = %student.student_id,
        notifications = marked,
        "Student approved"
    );

    Ok(ApiResponse::ok(
        ApprovedStudent {
            student,
            educators: AssignedEducators {
                primary: Some(EducatorSummary::from(&primary)),
                secondary: Some(EducatorSummary::from(&secondary)),
            },
        },
        "Student approved successfully",
    ))
}

fn find_educator(state: &AppState, id: &str) -> Result<Employee, ApiError> {
    match find_employee_by_any_id(state, id)? {
        Some(employee) if employee.role == Role::Educator => Ok(employee),
        Some(_) => Err(ApiError::BadRequest(format!(
            "Employee '{}' is not an educator",
            id.trim()
        ))),
        None => Err(ApiError::BadRequest(format!(
            "Educator '{}' not found",
            id.trim()
        ))),
    }
}
