//! Employee accounts: sign-up, sessions, profiles and administration.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use nurture_core::types::{Employee, EmployeeStatus, Role, Student};
use nurture_core::validate::{require_email, require_password};

use super::session::{end_session, start_session, LoginRequest};
use super::{discard_upload, find_employee_by_any_id, parse_date, present};
use crate::auth::{hash_password, verify_password, AuthUser, TokenPair};
use crate::error::ApiError;
use crate::media::{MultipartForm, UploadedFile};
use crate::response::ApiResponse;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateEmployeeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub designation: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub date_of_joining: Option<String>,
}

impl CreateEmployeeRequest {
    fn from_form(form: &MultipartForm) -> Self {
        let field = |name: &str| form.fields.get(name).cloned();
        Self {
            name: field("name"),
            email: field("email"),
            password: field("password"),
            designation: field("designation"),
            gender: field("gender"),
            phone: field("phone"),
            department: field("department"),
            date_of_joining: field("dateOfJoining"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmployeeListParams {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: EmployeeStatus,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct EmployeeSession {
    pub employee: Employee,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeProfile {
    #[serde(flatten)]
    pub employee: Employee,
    pub assigned_students: Vec<Student>,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/employees/create-account
///
/// Accepts JSON or multipart (with an optional `avatar` file). New accounts
/// are Staff, except the first account ever created, which becomes Admin.
pub async fn create_account(
    State(state): State<AppState>,
    req: Request,
) -> Result<ApiResponse<Employee>, ApiError> {
    let (body, avatar) = read_account_body(&state, req).await?;
    let employee = build_employee(&state, body, Role::Staff).await?;
    let employee = attach_avatar(&state, employee, avatar).await?;
    let employee = match state.employees.insert_bootstrapping_admin(&employee) {
        Ok(employee) => employee,
        Err(e) => {
            discard_avatar(&state, &employee).await;
            return Err(e.into());
        }
    };
    tracing::info!(
        employee_id = %employee.employee_id,
        role = employee.role.as_str(),
        "Employee account created"
    );
    Ok(ApiResponse::created(employee, "Employee account created successfully"))
}

/// POST /api/v1/employees/add-educator
pub async fn add_educator(
    State(state): State<AppState>,
    req: Request,
) -> Result<ApiResponse<Employee>, ApiError> {
    let (body, avatar) = read_account_body(&state, req).await?;
    let employee = build_employee(&state, body, Role::Educator).await?;
    let employee = attach_avatar(&state, employee, avatar).await?;
    if let Err(e) = state.employees.insert(&employee) {
        discard_avatar(&state, &employee).await;
        return Err(e.into());
    }
    tracing::info!(employee_id = %employee.employee_id, "Educator added");
    Ok(ApiResponse::created(employee, "Educator added successfully"))
}

async fn read_account_body(
    state: &AppState,
    req: Request,
) -> Result<(CreateEmployeeRequest, Option<UploadedFile>), ApiError> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let mut form = MultipartForm::read(multipart, state.config.media.max_upload_bytes).await?;
        let avatar = form.take_file("avatar");
        Ok((CreateEmployeeRequest::from_form(&form), avatar))
    } else {
        let Json(body) = Json::<CreateEmployeeRequest>::from_request(req, state).await?;
        Ok((body, None))
    }
}

async fn build_employee(
    state: &AppState,
    req: CreateEmployeeRequest,
    role: Role,
) -> Result<Employee, ApiError> {
    let missing = || {
        ApiError::BadRequest("Name, email, password and designation are required".to_string())
    };
    let name = present(&req.name).ok_or_else(missing)?;
    let email = present(&req.email).ok_or_else(missing)?;
    let password = req.password.as_deref().filter(|p| !p.is_empty()).ok_or_else(missing)?;
    let designation = present(&req.designation).ok_or_else(missing)?;

    let email = require_email("email", email)?;
    require_password(password)?;
    let date_of_joining = present(&req.date_of_joining)
        .map(|d| parse_date("dateOfJoining", d))
        .transpose()?;

    if state.employees.find_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict(
            "Employee with this email already exists".to_string(),
        ));
    }

    let password_hash = hash_password(password, state.tokens.bcrypt_cost()).await?;
    let now = Utc::now();
    Ok(Employee {
        id: Uuid::new_v4(),
        employee_id: nurture_core::ids::employee_id(),
        name: name.to_string(),
        email,
        password_hash,
        gender: present(&req.gender).map(str::to_string),
        phone: present(&req.phone).map(str::to_string),
        designation: designation.to_string(),
        department: present(&req.department).map(str::to_string),
        role,
        status: EmployeeStatus::Active,
        date_of_joining,
        avatar: None,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    })
}

async fn attach_avatar(
    state: &AppState,
    mut employee: Employee,
    avatar: Option<UploadedFile>,
) -> Result<Employee, ApiError> {
    if let Some(file) = avatar {
        file.ensure_allowed_type()?;
        employee.avatar = Some(state.media.upload(&file).await?);
    }
    Ok(employee)
}

async fn discard_avatar(state: &AppState, employee: &Employee) {
    if let Some(avatar) = &employee.avatar {
        discard_upload(state, &avatar.public_id).await;
    }
}

/// POST /api/v1/employees/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<EmployeeSession>), ApiError> {
    let Json(req) = payload?;
    let (email, password) = req.credentials()?;
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let employee = state.employees.find_by_email(&email)?.ok_or_else(invalid)?;
    if !verify_password(password, &employee.password_hash).await? {
        return Err(invalid());
    }
    if employee.status == EmployeeStatus::Inactive {
        return Err(ApiError::Forbidden("Account is inactive".to_string()));
    }

    let (jar, tokens) = start_session(&state, jar, employee.id, employee.role.into())?;
    tracing::info!(employee_id = %employee.employee_id, "Employee logged in");
    Ok((
        jar,
        ApiResponse::ok(
            EmployeeSession { employee, tokens },
            "Employee logged in successfully",
        ),
    ))
}

/// POST /api/v1/employees/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Value>), ApiError> {
    user.ensure_staff()?;
    let jar = end_session(&state, jar, user.id, user.role)?;
    Ok((
        jar,
        ApiResponse::ok(Value::Object(Default::default()), "Employee logged out successfully"),
    ))
}

/// GET /api/v1/employees/get-my-profile
pub async fn my_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<ApiResponse<EmployeeProfile>, ApiError> {
    user.ensure_staff()?;
    let employee = state
        .employees
        .find_by_id(user.id)?
        .ok_or_else(|| ApiError::NotFound("Employee not found".to_string()))?;
    let assigned_students = state.students.find_by_educator(employee.id)?;
    Ok(ApiResponse::ok(
        EmployeeProfile {
            employee,
            assigned_students,
        },
        "Profile fetched successfully",
    ))
}

/// GET /api/v1/employees/fetch-all-employees
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<EmployeeListParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<Employee>>, ApiError> {
    let Query(params) = params?;
    let role = params
        .role
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(str::parse::<Role>)
        .transpose()?;
    let employees = state.employees.list(role)?;
    Ok(ApiResponse::ok(employees, "Employees fetched successfully"))
}

/// PUT /api/v1/employees/{employee_id}/status
pub async fn set_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(employee_id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<ApiResponse<Employee>, ApiError> {
    let Json(req) = payload?;
    let mut employee = find_employee_by_any_id(&state, &employee_id)?
        .ok_or_else(|| ApiError::NotFound("Employee not found".to_string()))?;
    if employee.id == user.id && req.status == EmployeeStatus::Inactive {
        return Err(ApiError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    employee.status = req.status;
    let employee = state.employees.update(&employee)?;
    if employee.status == EmployeeStatus::Inactive {
        state.employees.set_refresh_token(employee.id, None)?;
    }
    tracing::info!(
        employee_id = %employee.employee_id,
        status = employee.status.as_str(),
        "Employee status changed"
    );
    Ok(ApiResponse::ok(employee, "Employee status updated successfully"))
}
