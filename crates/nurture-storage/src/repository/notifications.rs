use std::sync::Arc;

use chrono::Utc;
use rusqlite::{named_params, Row};
use uuid::Uuid;

use nurture_core::error::NurtureError;
use nurture_core::types::{AdminNotification, NotificationKind, NotificationStatus};

use super::{millis_to_datetime, parse_enum, parse_opt_uuid, parse_uuid, storage_err, OptionalExt};
use crate::db::Database;

const COLUMNS: &str = "id, title, message, kind, student_id, status, created_at, updated_at";

/// Repository for admin dashboard notifications.
pub struct NotificationRepository {
    db: Arc<Database>,
}

impl NotificationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, notification: &AdminNotification) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO admin_notifications ({}) VALUES
                        (:id, :title, :message, :kind, :student_id, :status, :created_at, :updated_at)",
                    COLUMNS
                ),
                named_params! {
                    ":id": notification.id.to_string(),
                    ":title": notification.title,
                    ":message": notification.message,
                    ":kind": notification.kind.as_str(),
                    ":student_id": notification.student.map(|u| u.to_string()),
                    ":status": notification.status.as_str(),
                    ":created_at": notification.created_at.timestamp_millis(),
                    ":updated_at": notification.updated_at.timestamp_millis(),
                },
            )
            .map_err(|e| storage_err("Failed to save notification", e))?;
            Ok(())
        })
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<AdminNotification>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM admin_notifications WHERE id = ?1",
                    COLUMNS
                ))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_notification(row))
                })
                .optional()
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// Notifications, newest first, optionally filtered by status.
    pub fn list(
        &self,
        status: Option<NotificationStatus>,
    ) -> Result<Vec<AdminNotification>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM admin_notifications
                     WHERE (?1 IS NULL OR status = ?1)
                     ORDER BY created_at DESC, rowid DESC",
                    COLUMNS
                ))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![status.map(|s| s.as_str())], |row| {
                    Ok(row_to_notification(row))
                })
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut notifications = Vec::new();
            for row in rows {
                notifications.push(row.map_err(|e| NurtureError::Storage(e.to_string()))??);
            }
            Ok(notifications)
        })
    }

    /// Change a notification's status. Returns the updated row, or `None`
    /// if no such notification exists.
    pub fn set_status(
        &self,
        id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<AdminNotification>, NurtureError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE admin_notifications SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), Utc::now().timestamp_millis(), id.to_string()],
            )
            .map_err(|e| storage_err("Failed to update notification", e))
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.find_by_id(id)
    }

    /// Mark the pending registration notification for `student` as
    /// approved. Returns how many rows changed.
    pub fn mark_registration_approved(&self, student: Uuid) -> Result<usize, NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE admin_notifications SET status = ?1, updated_at = ?2
                 WHERE student_id = ?3 AND kind = ?4 AND status = ?5",
                rusqlite::params![
                    NotificationStatus::Approved.as_str(),
                    Utc::now().timestamp_millis(),
                    student.to_string(),
                    NotificationKind::StudentRegistration.as_str(),
                    NotificationStatus::Pending.as_str(),
                ],
            )
            .map_err(|e| storage_err("Failed to update notification", e))
        })
    }
}

fn row_to_notification(row: &Row<'_>) -> Result<AdminNotification, NurtureError> {
    let get_err = |e: rusqlite::Error| NurtureError::Storage(e.to_string());

    let id: String = row.get("id").map_err(get_err)?;
    let kind: String = row.get("kind").map_err(get_err)?;
    let status: String = row.get("status").map_err(get_err)?;
    let created_at: i64 = row.get("created_at").map_err(get_err)?;
    let updated_at: i64 = row.get("updated_at").map_err(get_err)?;

    Ok(AdminNotification {
        id: parse_uuid(&id)?,
        title: row.get("title").map_err(get_err)?,
        message: row.get("message").map_err(get_err)?,
        kind: parse_enum(&kind)?,
        student: parse_opt_uuid(row.get("student_id").map_err(get_err)?)?,
        status: parse_enum(&status)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{make_db, make_student};
    use crate::repository::StudentRepository;

    #[test]
    fn test_registration_notification_lifecycle() {
        let db = make_db();
        let student = make_student("n@example.com");
        StudentRepository::new(db.clone()).insert(&student).unwrap();
        let repo = NotificationRepository::new(db);

        let notification = AdminNotification::student_registration(&student);
        repo.insert(&notification).unwrap();

        let pending = repo.list(Some(NotificationStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::StudentRegistration);
        assert_eq!(pending[0].student, Some(student.id));

        assert_eq!(repo.mark_registration_approved(student.id).unwrap(), 1);
        assert!(repo.list(Some(NotificationStatus::Pending)).unwrap().is_empty());
        let found = repo.find_by_id(notification.id).unwrap().unwrap();
        assert_eq!(found.status, NotificationStatus::Approved);

        // Already approved: nothing left to change.
        assert_eq!(repo.mark_registration_approved(student.id).unwrap(), 0);
    }

    #[test]
    fn test_set_status() {
        let db = make_db();
        let student = make_student("s@example.com");
        StudentRepository::new(db.clone()).insert(&student).unwrap();
        let repo = NotificationRepository::new(db);
        let notification = AdminNotification::student_registration(&student);
        repo.insert(&notification).unwrap();

        let read = repo
            .set_status(notification.id, NotificationStatus::Read)
            .unwrap()
            .unwrap();
        assert_eq!(read.status, NotificationStatus::Read);
        assert!(repo
            .set_status(Uuid::new_v4(), NotificationStatus::Read)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_unfiltered() {
        let db = make_db();
        let students = StudentRepository::new(db.clone());
        let repo = NotificationRepository::new(db);
        for email in ["a@example.com", "b@example.com"] {
            let student = make_student(email);
            students.insert(&student).unwrap();
            repo.insert(&AdminNotification::student_registration(&student)).unwrap();
        }
        assert_eq!(repo.list(None).unwrap().len(), 2);
    }
}
