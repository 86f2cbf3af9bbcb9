use std::sync::Arc;

use rusqlite::{named_params, Row};
use uuid::Uuid;

use nurture_core::error::NurtureError;
use nurture_core::types::StudentReport;

use super::{millis_to_datetime, parse_opt_uuid, parse_uuid, storage_err, OptionalExt};
use crate::db::Database;

/// Repository for written progress reports.
pub struct ReportRepository {
    db: Arc<Database>,
}

impl ReportRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, report: &StudentReport) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO student_reports
                    (id, student_id, author_id, program_feedback, feedback, assessment_report, created_at)
                 VALUES (:id, :student_id, :author_id, :program_feedback, :feedback, :assessment_report, :created_at)",
                named_params! {
                    ":id": report.id.to_string(),
                    ":student_id": report.student.to_string(),
                    ":author_id": report.author.map(|u| u.to_string()),
                    ":program_feedback": report.program_feedback,
                    ":feedback": report.feedback,
                    ":assessment_report": report.assessment_report,
                    ":created_at": report.created_at.timestamp_millis(),
                },
            )
            .map_err(|e| storage_err("Failed to save report", e))?;
            Ok(())
        })
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<StudentReport>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, student_id, author_id, program_feedback, feedback,
                            assessment_report, created_at
                     FROM student_reports WHERE id = ?1",
                )
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| Ok(row_to_report(row)))
                .optional()
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Reports for one student, newest first.
    pub fn list_for_student(&self, student: Uuid) -> Result<Vec<StudentReport>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, student_id, author_id, program_feedback, feedback,
                            assessment_report, created_at
                     FROM student_reports WHERE student_id = ?1
                     ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![student.to_string()], |row| {
                    Ok(row_to_report(row))
                })
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut reports = Vec::new();
            for row in rows {
                reports.push(row.map_err(|e| NurtureError::Storage(e.to_string()))??);
            }
            Ok(reports)
        })
    }
}

fn row_to_report(row: &Row<'_>) -> Result<StudentReport, NurtureError> {
    let get_err = |e: rusqlite::Error| NurtureError::Storage(e.to_string());

    let id: String = row.get("id").map_err(get_err)?;
    let student: String = row.get("student_id").map_err(get_err)?;
    let created_at: i64 = row.get("created_at").map_err(get_err)?;

    Ok(StudentReport {
        id: parse_uuid(&id)?,
        student: parse_uuid(&student)?,
        author: parse_opt_uuid(row.get("author_id").map_err(get_err)?)?,
        program_feedback: row.get("program_feedback").map_err(get_err)?,
        feedback: row.get("feedback").map_err(get_err)?,
        assessment_report: row.get("assessment_report").map_err(get_err)?,
        created_at: millis_to_datetime(created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{make_db, make_student};
    use crate::repository::StudentRepository;
    use chrono::{Duration, Utc};

    fn make_report(student: Uuid, feedback: &str) -> StudentReport {
        StudentReport {
            id: Uuid::new_v4(),
            student,
            author: None,
            program_feedback: Some("Settling in well".to_string()),
            feedback: feedback.to_string(),
            assessment_report: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = make_db();
        let student = make_student("r@example.com");
        StudentRepository::new(db.clone()).insert(&student).unwrap();
        let repo = ReportRepository::new(db);

        let report = make_report(student.id, "Good progress");
        repo.insert(&report).unwrap();

        let found = repo.find_by_id(report.id).unwrap().unwrap();
        assert_eq!(found.feedback, "Good progress");
        assert_eq!(found.program_feedback.as_deref(), Some("Settling in well"));
        assert!(repo.find_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let db = make_db();
        let student = make_student("n@example.com");
        StudentRepository::new(db.clone()).insert(&student).unwrap();
        let repo = ReportRepository::new(db);

        let mut older = make_report(student.id, "older");
        older.created_at = Utc::now() - Duration::days(3);
        let newer = make_report(student.id, "newer");
        repo.insert(&older).unwrap();
        repo.insert(&newer).unwrap();

        let reports = repo.list_for_student(student.id).unwrap();
        let feedback: Vec<&str> = reports.iter().map(|r| r.feedback.as_str()).collect();
        assert_eq!(feedback, vec!["newer", "older"]);
    }

    #[test]
    fn test_report_for_unknown_student_rejected() {
        let repo = ReportRepository::new(make_db());
        assert!(repo.insert(&make_report(Uuid::new_v4(), "x")).is_err());
    }
}
