//! Application state shared across all route handlers.
//!
//! AppState holds the repositories, the token service and the pluggable
//! media and chat backends. It is passed to handlers via axum's State
//! extractor.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use nurture_core::config::NurtureConfig;
use nurture_storage::{
    AttendanceRepository, Database, EmployeeRepository, NotificationRepository, ReportRepository,
    StudentRepository,
};

use crate::auth::TokenService;
use crate::chat::TextGenerator;
use crate::media::MediaStore;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<NurtureConfig>,
    pub students: Arc<StudentRepository>,
    pub employees: Arc<EmployeeRepository>,
    pub attendance: Arc<AttendanceRepository>,
    pub reports: Arc<ReportRepository>,
    pub notifications: Arc<NotificationRepository>,
    /// JWT signing/verification and session cookie settings.
    pub tokens: Arc<TokenService>,
    /// Avatar and document storage.
    pub media: Arc<dyn MediaStore>,
    /// Directory served under `/media` when files are stored on disk.
    pub media_dir: Option<PathBuf>,
    /// Chatbot backend; `None` when the chatbot is not configured.
    pub chat: Option<Arc<dyn TextGenerator>>,
    /// Broadcast sender for admin notification SSE events.
    pub event_tx: tokio::sync::broadcast::Sender<serde_json::Value>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(
        config: NurtureConfig,
        database: Database,
        media: Arc<dyn MediaStore>,
        chat: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        let database = Arc::new(database);
        let tokens = TokenService::new(&config.auth);
        let (event_tx, _) = tokio::sync::broadcast::channel(256);
        Self {
            config: Arc::new(config),
            students: Arc::new(StudentRepository::new(Arc::clone(&database))),
            employees: Arc::new(EmployeeRepository::new(Arc::clone(&database))),
            attendance: Arc::new(AttendanceRepository::new(Arc::clone(&database))),
            reports: Arc::new(ReportRepository::new(Arc::clone(&database))),
            notifications: Arc::new(NotificationRepository::new(database)),
            tokens: Arc::new(tokens),
            media,
            media_dir: None,
            chat,
            event_tx,
            start_time: Instant::now(),
        }
    }

    /// Serve files from `dir` under `/media`.
    pub fn with_media_dir(mut self, dir: PathBuf) -> Self {
        self.media_dir = Some(dir);
        self
    }
}
