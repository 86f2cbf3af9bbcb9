//! API error types and the JSON error envelope.
//!
//! Every failure leaves the server as
//! `{ statusCode, error, message, success: false }` with a matching HTTP
//! status. Internal details are logged, never returned.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use nurture_core::error::NurtureError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    pub success: bool,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 401 Unauthorized - missing, invalid or expired credentials.
    Unauthorized(String),
    /// 403 Forbidden - authenticated but not allowed.
    Forbidden(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - duplicate record.
    Conflict(String),
    /// 413 Payload Too Large - upload over the configured limit.
    PayloadTooLarge(String),
    /// 429 Too Many Requests - rate limit exceeded.
    TooManyRequests(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 502 Bad Gateway - the media host or chat provider failed.
    BadGateway(String),
    /// 503 Service Unavailable - feature not configured.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::Internal(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::Unauthorized(msg) => ("unauthorized", msg),
            ApiError::Forbidden(msg) => ("forbidden", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::PayloadTooLarge(msg) => ("payload_too_large", msg),
            ApiError::TooManyRequests(msg) => ("too_many_requests", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                ("internal_error", "An internal error occurred".to_string())
            }
            ApiError::BadGateway(msg) => ("bad_gateway", msg),
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg),
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            error: error_code.to_string(),
            message,
            success: false,
        };

        (status, Json(body)).into_response()
    }
}

impl From<NurtureError> for ApiError {
    fn from(err: NurtureError) -> Self {
        match err {
            NurtureError::Validation(msg) => ApiError::BadRequest(msg),
            NurtureError::NotFound(msg) => ApiError::NotFound(msg),
            NurtureError::Auth(msg) => ApiError::Unauthorized(msg),
            NurtureError::Duplicate(msg) => {
                tracing::debug!(detail = %msg, "Duplicate record rejected");
                ApiError::Conflict("A record with these details already exists".to_string())
            }
            NurtureError::Media(msg) => {
                tracing::warn!(error = %msg, "Media host request failed");
                ApiError::BadGateway("Failed to upload file to media storage".to_string())
            }
            NurtureError::Chat(msg) => {
                tracing::warn!(error = %msg, "Chat provider request failed");
                ApiError::BadGateway("The assistant is unavailable right now".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Uploaded file is too large".to_string())
        } else {
            ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(err: PathRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, ErrorBody) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let (status, body) = body_of(ApiError::NotFound("Student not found".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.status_code, 404);
        assert_eq!(body.error, "not_found");
        assert_eq!(body.message, "Student not found");
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_internal_error_sanitized() {
        let (status, body) =
            body_of(ApiError::Internal("secret db connection string".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "An internal error occurred");
    }

    #[tokio::test]
    async fn test_storage_error_sanitized() {
        let err: ApiError = NurtureError::Storage("sqlite: disk full at /var/db".to_string()).into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("sqlite"));
        assert!(!body.message.contains("/var/db"));
    }

    #[tokio::test]
    async fn test_duplicate_maps_to_conflict_without_table_names() {
        let err: ApiError =
            NurtureError::Duplicate("UNIQUE constraint failed: students.student_email".to_string())
                .into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!body.message.contains("students."));
    }

    #[test]
    fn test_nurture_error_mapping() {
        let cases = [
            (NurtureError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (NurtureError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (NurtureError::Auth("x".into()), StatusCode::UNAUTHORIZED),
            (NurtureError::Media("x".into()), StatusCode::BAD_GATEWAY),
            (NurtureError::Chat("x".into()), StatusCode::BAD_GATEWAY),
            (NurtureError::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
