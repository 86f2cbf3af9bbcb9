//! Route handler functions for all API endpoints.
//!
//! Each submodule owns one resource. Handlers extract path/query/body
//! parameters via axum extractors, work through the repositories in
//! AppState, and return [`ApiResponse`](crate::response::ApiResponse)
//! envelopes.

pub mod attendance;
pub mod chat;
pub mod employees;
pub mod health;
pub mod notifications;
pub mod reports;
pub mod session;
pub mod students;

use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use nurture_core::types::{AdminNotification, Employee, Student};

use crate::error::ApiError;
use crate::state::AppState;

/// Trimmed, non-empty value of an optional string field.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts a string or a number. Blank strings and zero count as missing.
pub(crate) fn scalar_text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse `YYYY-MM-DD`, also accepting a full RFC 3339 timestamp.
pub(crate) fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.date_naive()))
        .map_err(|_| ApiError::BadRequest(format!("'{}' must be a date (YYYY-MM-DD)", field)))
}

pub(crate) fn find_student(state: &AppState, student_id: &str) -> Result<Student, ApiError> {
    state
        .students
        .find_by_student_id(student_id.trim())?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))
}

/// Look up an employee by UUID or by `EMP…` id.
pub(crate) fn find_employee_by_any_id(
    state: &AppState,
    id: &str,
) -> Result<Option<Employee>, ApiError> {
    let id = id.trim();
    let found = match uuid::Uuid::parse_str(id) {
        Ok(uuid) => state.employees.find_by_id(uuid)?,
        Err(_) => state.employees.find_by_employee_id(id)?,
    };
    Ok(found)
}

/// Push a notification to live SSE subscribers. Having no subscriber is
/// not an error.
pub(crate) fn publish_notification(state: &AppState, notification: &AdminNotification) {
    match serde_json::to_value(notification) {
        Ok(data) => {
            let _ = state
                .event_tx
                .send(serde_json::json!({ "type": "notification", "data": data }));
        }
        Err(e) => tracing::warn!(error = %e, "Failed to serialise notification event"),
    }
}

/// Delete an upload that no stored record points at. Failure is only logged.
pub(crate) async fn discard_upload(state: &AppState, public_id: &str) {
    if let Err(e) = state.media.delete(public_id).await {
        tracing::warn!(public_id, error = %e, "Failed to delete orphaned upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&Some(Value::from(9876543210u64))).as_deref(), Some("9876543210"));
        assert_eq!(scalar_text(&Some(Value::from(" 98 "))).as_deref(), Some("98"));
        assert_eq!(scalar_text(&Some(Value::from(0))), None);
        assert_eq!(scalar_text(&Some(Value::from("  "))), None);
        assert_eq!(scalar_text(&Some(Value::Null)), None);
        assert_eq!(scalar_text(&None), None);
    }

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2012, 4, 9).unwrap();
        assert_eq!(parse_date("dateOfBirth", "2012-04-09").unwrap(), expected);
        assert_eq!(parse_date("dateOfBirth", "2012-04-09T00:00:00.000Z").unwrap(), expected);
        assert!(parse_date("dateOfBirth", "09/04/2012").is_err());
    }

    #[test]
    fn test_present() {
        assert_eq!(present(&Some("  x ".to_string())), Some("x"));
        assert_eq!(present(&Some("   ".to_string())), None);
        assert_eq!(present(&None), None);
    }
}
