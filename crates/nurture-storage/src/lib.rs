//! Nurture Storage crate - SQLite persistence for students, staff,
//! attendance, progress reports and admin notifications.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and one
//! repository per record type.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{
    AttendanceMark, AttendanceRepository, EmployeeRepository, NotificationRepository,
    ReportRepository, StudentFilter, StudentRepository,
};
