use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rusqlite::{named_params, Connection, Row};
use uuid::Uuid;

use nurture_core::error::NurtureError;
use nurture_core::types::{AttendanceCode, AttendanceRecord};

use super::{
    from_json, millis_to_datetime, parse_opt_uuid, parse_uuid, storage_err, to_json, OptionalExt,
};
use crate::db::Database;

/// One day's mark for one student.
#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub student: Uuid,
    pub date: NaiveDate,
    pub code: AttendanceCode,
    pub educator: Option<Uuid>,
}

/// Repository for per-student attendance records.
pub struct AttendanceRepository {
    db: Arc<Database>,
}

impl AttendanceRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn find_by_student(&self, student: Uuid) -> Result<Option<AttendanceRecord>, NurtureError> {
        self.db.with_conn(|conn| load(conn, student))
    }

    /// Apply a single mark, creating the record on first use.
    pub fn mark(&self, mark: &AttendanceMark) -> Result<AttendanceRecord, NurtureError> {
        self.db.with_transaction(|conn| apply(conn, mark))
    }

    /// Apply every mark in one transaction. Nothing is written if any
    /// mark fails.
    pub fn apply_marks(
        &self,
        marks: &[AttendanceMark],
    ) -> Result<Vec<AttendanceRecord>, NurtureError> {
        self.db.with_transaction(|conn| {
            marks.iter().map(|mark| apply(conn, mark)).collect()
        })
    }
}

fn apply(conn: &Connection, mark: &AttendanceMark) -> Result<AttendanceRecord, NurtureError> {
    let mut record = load(conn, mark.student)?.unwrap_or_else(|| AttendanceRecord::new(mark.student));
    record.mark(mark.date, mark.code);
    if mark.educator.is_some() {
        record.educator = mark.educator;
    }
    record.updated_at = Utc::now();
    save(conn, &record)?;
    Ok(record)
}

fn load(conn: &Connection, student: Uuid) -> Result<Option<AttendanceRecord>, NurtureError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, educator_id, report, created_at, updated_at
             FROM attendance WHERE student_id = ?1",
        )
        .map_err(|e| NurtureError::Storage(e.to_string()))?;

    let result = stmt
        .query_row(rusqlite::params![student.to_string()], |row| {
            Ok(row_to_record(row))
        })
        .optional()
        .map_err(|e| NurtureError::Storage(e.to_string()))?;

    result.transpose()
}

fn save(conn: &Connection, record: &AttendanceRecord) -> Result<(), NurtureError> {
    conn.execute(
        "INSERT INTO attendance (id, student_id, educator_id, report, created_at, updated_at)
         VALUES (:id, :student_id, :educator_id, :report, :created_at, :updated_at)
         ON CONFLICT(student_id) DO UPDATE SET
            educator_id = excluded.educator_id,
            report = excluded.report,
            updated_at = excluded.updated_at",
        named_params! {
            ":id": record.id.to_string(),
            ":student_id": record.student.to_string(),
            ":educator_id": record.educator.map(|u| u.to_string()),
            ":report": to_json(&record.report)?,
            ":created_at": record.created_at.timestamp_millis(),
            ":updated_at": record.updated_at.timestamp_millis(),
        },
    )
    .map_err(|e| storage_err("Failed to save attendance", e))?;
    Ok(())
}

fn row_to_record(row: &Row<'_>) -> Result<AttendanceRecord, NurtureError> {
    let get_err = |e: rusqlite::Error| NurtureError::Storage(e.to_string());

    let id: String = row.get("id").map_err(get_err)?;
    let student: String = row.get("student_id").map_err(get_err)?;
    let report: String = row.get("report").map_err(get_err)?;
    let created_at: i64 = row.get("created_at").map_err(get_err)?;
    let updated_at: i64 = row.get("updated_at").map_err(get_err)?;

    Ok(AttendanceRecord {
        id: parse_uuid(&id)?,
        student: parse_uuid(&student)?,
        educator: parse_opt_uuid(row.get("educator_id").map_err(get_err)?)?,
        report: from_json(&report)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}
