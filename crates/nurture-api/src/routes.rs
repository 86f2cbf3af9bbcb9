//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the auth
//! guards and all endpoint handlers. Everything lives under `/api/v1`;
//! disk-stored media is served from `/media`.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use nurture_core::config::NurtureConfig;
use nurture_core::error::NurtureError;

use crate::auth::{require_admin, require_auth, require_staff};
use crate::handlers::{
    attendance, chat, employees, health, notifications, reports, session, students,
};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::AppState;

/// Body limit for JSON endpoints.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

fn cors_layer(config: &NurtureConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // Credentialed requests cannot use a wildcard origin.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let upload_limit = DefaultBodyLimit::max(state.config.media.max_upload_bytes + JSON_BODY_LIMIT);

    // Credential endpoints, rate limited.
    let limiter = RateLimiter::new(state.config.server.rate_limit_per_sec);
    let credential_routes = Router::new()
        .route("/students/register", post(students::register))
        .route("/students/login", post(students::login))
        .route(
            "/employees/create-account",
            post(employees::create_account).layer(upload_limit),
        )
        .route("/employees/login", post(employees::login))
        .route("/auth/refresh", post(session::refresh))
        .layer(from_fn(rate_limit_middleware))
        .layer(Extension(limiter));

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .merge(credential_routes);

    // Any signed-in account.
    let account_routes = Router::new()
        .route("/students/logout", post(students::logout))
        .route("/students/profile", get(students::my_profile))
        .route("/students/change-password", put(students::change_password))
        .route("/students/{student_id}", put(students::update))
        .route(
            "/students/avatar",
            post(students::upload_avatar).layer(upload_limit),
        )
        .route(
            "/students/{student_id}/udid",
            post(students::upload_udid).layer(upload_limit),
        )
        .route("/employees/logout", post(employees::logout))
        .route("/employees/get-my-profile", get(employees::my_profile))
        .route("/attendance/{student_id}", get(attendance::report))
        .route("/attendance/{student_id}/summary", get(attendance::summary))
        .route("/reports/student/{student_id}", get(reports::list_for_student))
        .route("/reports/{id}", get(reports::get))
        .route("/chat", post(chat::chat));

    let staff_routes = Router::new()
        .route("/students", get(students::list))
        .route("/students/{student_id}/profile", get(students::profile))
        .route("/attendance/mark", post(attendance::mark))
        .route("/attendance/bulk", post(attendance::bulk))
        .route("/reports", post(reports::create))
        .route_layer(from_fn(require_staff));

    let admin_routes = Router::new()
        .route("/students/approve", post(students::approve))
        .route(
            "/employees/add-educator",
            post(employees::add_educator).layer(upload_limit),
        )
        .route("/employees/fetch-all-employees", get(employees::list))
        .route("/employees/{employee_id}/status", put(employees::set_status))
        .route("/admin/notifications", get(notifications::list))
        .route("/admin/notifications/{id}/read", put(notifications::mark_read))
        .route("/admin/notifications/stream", get(notifications::stream))
        .route_layer(from_fn(require_admin));

    // require_auth wraps the role guards, so it runs first.
    let protected_routes = account_routes
        .merge(staff_routes)
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = public_routes.merge(protected_routes);

    let mut router = Router::new().nest("/api/v1", api);
    if let Some(dir) = &state.media_dir {
        router = router.nest_service("/media", ServeDir::new(dir));
    }

    router
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address and run until Ctrl-C.
pub async fn start_server(config: &NurtureConfig, state: AppState) -> Result<(), NurtureError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = create_router(make_state());
        let resp = app
            .oneshot(get_request("/api/v1/students/profile", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["statusCode"], 401);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = create_router(make_state());
        let resp = app
            .oneshot(get_request("/api/v1/nope", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let app = create_router(make_state());
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/students/login")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            resp.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_on_credential_routes() {
        let mut config = test_config();
        config.server.rate_limit_per_sec = 1;
        let state = AppState::new(
            config,
            nurture_storage::Database::in_memory().unwrap(),
            std::sync::Arc::new(FakeMedia::default()),
            None,
        );
        let app = create_router(state);

        let mut limited = false;
        for _ in 0..5 {
            let resp = app
                .clone()
                .oneshot(json_request("POST", "/api/v1/students/login", None, "{}"))
                .await
                .unwrap();
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                limited = true;
            }
        }
        assert!(limited);

        // Health is not rate limited.
        let resp = app.oneshot(get_request("/api/v1/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disk_media_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let state = make_state().with_media_dir(dir.path().to_path_buf());
        let app = create_router(state);

        let resp = app.oneshot(get_request("/media/a.txt", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
