//! Nurture API crate - axum HTTP server, route handlers, session auth and
//! the live notification stream.
//!
//! Provides the REST API for student registration and approval, staff
//! accounts, attendance, progress reports, media uploads and the chatbot.

pub mod auth;
pub mod chat;
pub mod error;
pub mod handlers;
pub mod media;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::{create_router, start_server};
pub use state::AppState;
