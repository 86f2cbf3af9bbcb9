//! Liveness endpoint.

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub students: u64,
    pub employees: u64,
}

/// GET /api/v1/health
pub async fn health(
    State(state): State<AppState>,
) -> Result<ApiResponse<HealthResponse>, ApiError> {
    Ok(ApiResponse::ok(
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.start_time.elapsed().as_secs(),
            students: state.students.count()?,
            employees: state.employees.count()?,
        },
        "Server is healthy",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::routes::create_router;
    use axum::http::StatusCode;
    use nurture_core::types::Role;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_counts_accounts() {
        let state = make_state();
        seed_employee(&state, "admin@example.com", Role::Admin).await;
        seed_student(&state, "kid@example.com", false).await;
        seed_student(&state, "kid2@example.com", true).await;
        let app = create_router(state);

        let resp = app.oneshot(get_request("/api/v1/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["status"], "healthy");
        assert_eq!(json["data"]["students"], 2);
        assert_eq!(json["data"]["employees"], 1);
        assert_eq!(json["data"]["version"], env!("CARGO_PKG_VERSION"));
    }
}
