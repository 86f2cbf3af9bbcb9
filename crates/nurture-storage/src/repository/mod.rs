//! Repository implementations for SQLite-backed persistence.
//!
//! One repository per record type, each holding an `Arc<Database>` and
//! issuing raw SQL. Embedded documents and lists are stored as JSON text.

mod attendance;
mod employees;
mod notifications;
mod reports;
mod students;

pub use attendance::{AttendanceMark, AttendanceRepository};
pub use employees::EmployeeRepository;
pub use notifications::NotificationRepository;
pub use reports::ReportRepository;
pub use students::{StudentFilter, StudentRepository};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use nurture_core::error::NurtureError;

/// Map a rusqlite error, turning UNIQUE / PRIMARY KEY violations into
/// [`NurtureError::Duplicate`].
pub(crate) fn storage_err(context: &str, err: rusqlite::Error) -> NurtureError {
    if let rusqlite::Error::SqliteFailure(ref code, ref msg) = err {
        let unique = code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY;
        if unique {
            return NurtureError::Duplicate(
                msg.clone().unwrap_or_else(|| context.to_string()),
            );
        }
    }
    NurtureError::Storage(format!("{}: {}", context, err))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, NurtureError> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, NurtureError> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn parse_uuid(text: &str) -> Result<Uuid, NurtureError> {
    Uuid::parse_str(text).map_err(|e| NurtureError::Storage(format!("Invalid UUID '{}': {}", text, e)))
}

pub(crate) fn parse_opt_uuid(text: Option<String>) -> Result<Option<Uuid>, NurtureError> {
    text.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_date(text: &str) -> Result<NaiveDate, NurtureError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| NurtureError::Storage(format!("Invalid date '{}': {}", text, e)))
}

pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub(crate) fn parse_enum<T>(text: &str) -> Result<T, NurtureError>
where
    T: std::str::FromStr<Err = NurtureError>,
{
    text.parse()
        .map_err(|e: NurtureError| NurtureError::Storage(e.to_string()))
}

/// Extension trait for rusqlite to support optional query results.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
