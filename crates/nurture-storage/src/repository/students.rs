use std::sync::Arc;

use chrono::Utc;
use rusqlite::{named_params, Row};
use uuid::Uuid;

use nurture_core::error::NurtureError;
use nurture_core::types::{Student, StudentStatus};

use super::{
    from_json, millis_to_datetime, parse_date, parse_enum, parse_opt_uuid, parse_uuid,
    storage_err, to_json, OptionalExt,
};
use crate::db::Database;

const COLUMNS: &str = "id, student_id, first_name, last_name, student_email, password_hash,
    gender, date_of_birth, primary_diagnosis, comorbidity, allergies, medical_history, address,
    fathers_name, mothers_name, parent_email, contact_number, guardian_details, programs,
    number_of_sessions, timings, days_of_week, session_type, transport, preferred_language,
    status, is_approved, enrollment_year, primary_educator, secondary_educator, avatar, udid,
    strengths, weaknesses, comments, refresh_token, created_at, updated_at";

/// Optional filters for listing students.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub approved: Option<bool>,
    pub status: Option<StudentStatus>,
}

/// Repository for student records.
pub struct StudentRepository {
    db: Arc<Database>,
}

impl StudentRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new student. Duplicate email or StudentId yields
    /// [`NurtureError::Duplicate`].
    pub fn insert(&self, student: &Student) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO students ({}) VALUES (
                        :id, :student_id, :first_name, :last_name, :student_email, :password_hash,
                        :gender, :date_of_birth, :primary_diagnosis, :comorbidity, :allergies,
                        :medical_history, :address, :fathers_name, :mothers_name, :parent_email,
                        :contact_number, :guardian_details, :programs, :number_of_sessions, :timings,
                        :days_of_week, :session_type, :transport, :preferred_language, :status,
                        :is_approved, :enrollment_year, :primary_educator, :secondary_educator,
                        :avatar, :udid, :strengths, :weaknesses, :comments, :refresh_token,
                        :created_at, :updated_at)",
                    COLUMNS
                ),
                named_params! {
                    ":id": student.id.to_string(),
                    ":student_id": student.student_id,
                    ":first_name": student.first_name,
                    ":last_name": student.last_name,
                    ":student_email": student.student_email,
                    ":password_hash": student.password_hash,
                    ":gender": student.gender,
                    ":date_of_birth": student.date_of_birth.format("%Y-%m-%d").to_string(),
                    ":primary_diagnosis": student.primary_diagnosis,
                    ":comorbidity": student.comorbidity,
                    ":allergies": to_json(&student.allergies)?,
                    ":medical_history": to_json(&student.medical_history)?,
                    ":address": student.address,
                    ":fathers_name": student.fathers_name,
                    ":mothers_name": student.mothers_name,
                    ":parent_email": student.parent_email,
                    ":contact_number": student.contact_number,
                    ":guardian_details": to_json(&student.guardian_details)?,
                    ":programs": to_json(&student.programs)?,
                    ":number_of_sessions": student.number_of_sessions,
                    ":timings": student.timings,
                    ":days_of_week": to_json(&student.days_of_week)?,
                    ":session_type": student.session_type.as_str(),
                    ":transport": student.transport,
                    ":preferred_language": student.preferred_language,
                    ":status": student.status.as_str(),
                    ":is_approved": student.is_approved,
                    ":enrollment_year": student.enrollment_year,
                    ":primary_educator": student.primary_educator.map(|u| u.to_string()),
                    ":secondary_educator": student.secondary_educator.map(|u| u.to_string()),
                    ":avatar": student.avatar.as_ref().map(to_json).transpose()?,
                    ":udid": to_json(&student.udid)?,
                    ":strengths": to_json(&student.strengths)?,
                    ":weaknesses": to_json(&student.weaknesses)?,
                    ":comments": student.comments,
                    ":refresh_token": student.refresh_token,
                    ":created_at": student.created_at.timestamp_millis(),
                    ":updated_at": student.updated_at.timestamp_millis(),
                },
            )
            .map_err(|e| storage_err("Failed to save student", e))?;
            Ok(())
        })
    }

    /// Persist the profile fields of an existing student and bump
    /// `updated_at`. Returns `NotFound` if the row is gone.
    ///
    /// The password hash and refresh token are not written here; callers
    /// holding an older copy of the row must not clobber a newer session.
    pub fn update(&self, student: &Student) -> Result<Student, NurtureError> {
        let mut updated = student.clone();
        updated.updated_at = Utc::now();

        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE students SET
                    first_name = :first_name, last_name = :last_name,
                    student_email = :student_email, gender = :gender, date_of_birth = :date_of_birth,
                    primary_diagnosis = :primary_diagnosis, comorbidity = :comorbidity,
                    allergies = :allergies, medical_history = :medical_history,
                    address = :address, fathers_name = :fathers_name,
                    mothers_name = :mothers_name, parent_email = :parent_email,
                    contact_number = :contact_number, guardian_details = :guardian_details,
                    programs = :programs, number_of_sessions = :number_of_sessions,
                    timings = :timings, days_of_week = :days_of_week,
                    session_type = :session_type, transport = :transport,
                    preferred_language = :preferred_language, status = :status,
                    is_approved = :is_approved, enrollment_year = :enrollment_year,
                    primary_educator = :primary_educator,
                    secondary_educator = :secondary_educator, avatar = :avatar, udid = :udid,
                    strengths = :strengths, weaknesses = :weaknesses, comments = :comments,
                    updated_at = :updated_at
                 WHERE id = :id",
                named_params! {
                    ":id": updated.id.to_string(),
                    ":first_name": updated.first_name,
                    ":last_name": updated.last_name,
                    ":student_email": updated.student_email,
                    ":gender": updated.gender,
                    ":date_of_birth": updated.date_of_birth.format("%Y-%m-%d").to_string(),
                    ":primary_diagnosis": updated.primary_diagnosis,
                    ":comorbidity": updated.comorbidity,
                    ":allergies": to_json(&updated.allergies)?,
                    ":medical_history": to_json(&updated.medical_history)?,
                    ":address": updated.address,
                    ":fathers_name": updated.fathers_name,
                    ":mothers_name": updated.mothers_name,
                    ":parent_email": updated.parent_email,
                    ":contact_number": updated.contact_number,
                    ":guardian_details": to_json(&updated.guardian_details)?,
                    ":programs": to_json(&updated.programs)?,
                    ":number_of_sessions": updated.number_of_sessions,
                    ":timings": updated.timings,
                    ":days_of_week": to_json(&updated.days_of_week)?,
                    ":session_type": updated.session_type.as_str(),
                    ":transport": updated.transport,
                    ":preferred_language": updated.preferred_language,
                    ":status": updated.status.as_str(),
                    ":is_approved": updated.is_approved,
                    ":enrollment_year": updated.enrollment_year,
                    ":primary_educator": updated.primary_educator.map(|u| u.to_string()),
                    ":secondary_educator": updated.secondary_educator.map(|u| u.to_string()),
                    ":avatar": updated.avatar.as_ref().map(to_json).transpose()?,
                    ":udid": to_json(&updated.udid)?,
                    ":strengths": to_json(&updated.strengths)?,
                    ":weaknesses": to_json(&updated.weaknesses)?,
                    ":comments": updated.comments,
                    ":updated_at": updated.updated_at.timestamp_millis(),
                },
            )
            .map_err(|e| storage_err("Failed to update student", e))
        })?;

        if changed == 0 {
            return Err(NurtureError::NotFound(format!("student {}", student.student_id)));
        }
        Ok(updated)
    }

    /// Store (or clear) the refresh token without touching other fields.
    pub fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE students SET refresh_token = ?1 WHERE id = ?2",
                rusqlite::params![token, id.to_string()],
            )
            .map_err(|e| storage_err("Failed to store refresh token", e))?;
            Ok(())
        })
    }

    /// Swap `old` for `new` only if `old` is still the stored token.
    /// Returns false when another request already rotated or cleared it.
    pub fn rotate_refresh_token(
        &self,
        id: Uuid,
        old: &str,
        new: &str,
    ) -> Result<bool, NurtureError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE students SET refresh_token = ?1 WHERE id = ?2 AND refresh_token = ?3",
                    rusqlite::params![new, id.to_string(), old],
                )
                .map_err(|e| storage_err("Failed to rotate refresh token", e))?;
            Ok(changed == 1)
        })
    }

    /// Replace the password hash without touching the session.
    pub fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), NurtureError> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE students SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![hash, Utc::now().timestamp_millis(), id.to_string()],
            )
            .map_err(|e| storage_err("Failed to store password", e))
        })?;
        if changed == 0 {
            return Err(NurtureError::NotFound(format!("student {}", id)));
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Student>, NurtureError> {
        self.find_one("id = ?1", &id.to_string())
    }

    /// Look up by the human-readable `STU…` id.
    pub fn find_by_student_id(&self, student_id: &str) -> Result<Option<Student>, NurtureError> {
        self.find_one("student_id = ?1", student_id)
    }

    /// Look up by (already normalised) email.
    pub fn find_by_email(&self, email: &str) -> Result<Option<Student>, NurtureError> {
        self.find_one("student_email = ?1", email)
    }

    fn find_one(&self, predicate: &str, value: &str) -> Result<Option<Student>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM students WHERE {}", COLUMNS, predicate))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![value], |row| Ok(row_to_student(row)))
                .optional()
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// All students matching the filter, newest registrations first.
    pub fn list(&self, filter: &StudentFilter) -> Result<Vec<Student>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM students
                     WHERE (:approved IS NULL OR is_approved = :approved)
                       AND (:status IS NULL OR status = :status)
                     ORDER BY created_at DESC, rowid DESC",
                    COLUMNS
                ))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    named_params! {
                        ":approved": filter.approved,
                        ":status": filter.status.map(|s| s.as_str()),
                    },
                    |row| Ok(row_to_student(row)),
                )
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut students = Vec::new();
            for row in rows {
                students.push(row.map_err(|e| NurtureError::Storage(e.to_string()))??);
            }
            Ok(students)
        })
    }

    /// Students that have `educator` as primary or secondary educator.
    pub fn find_by_educator(&self, educator: Uuid) -> Result<Vec<Student>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM students
                     WHERE primary_educator = ?1 OR secondary_educator = ?1
                     ORDER BY first_name, last_name",
                    COLUMNS
                ))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![educator.to_string()], |row| {
                    Ok(row_to_student(row))
                })
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut students = Vec::new();
            for row in rows {
                students.push(row.map_err(|e| NurtureError::Storage(e.to_string()))??);
            }
            Ok(students)
        })
    }

    pub fn count(&self) -> Result<u64, NurtureError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn row_to_student(row: &Row<'_>) -> Result<Student, NurtureError> {
    let get_err = |e: rusqlite::Error| NurtureError::Storage(e.to_string());

    let id: String = row.get("id").map_err(get_err)?;
    let date_of_birth: String = row.get("date_of_birth").map_err(get_err)?;
    let allergies: String = row.get("allergies").map_err(get_err)?;
    let medical_history: String = row.get("medical_history").map_err(get_err)?;
    let guardian_details: String = row.get("guardian_details").map_err(get_err)?;
    let programs: String = row.get("programs").map_err(get_err)?;
    let days_of_week: String = row.get("days_of_week").map_err(get_err)?;
    let session_type: String = row.get("session_type").map_err(get_err)?;
    let status: String = row.get("status").map_err(get_err)?;
    let avatar: Option<String> = row.get("avatar").map_err(get_err)?;
    let udid: String = row.get("udid").map_err(get_err)?;
    let strengths: String = row.get("strengths").map_err(get_err)?;
    let weaknesses: String = row.get("weaknesses").map_err(get_err)?;
    let created_at: i64 = row.get("created_at").map_err(get_err)?;
    let updated_at: i64 = row.get("updated_at").map_err(get_err)?;

    Ok(Student {
        id: parse_uuid(&id)?,
        student_id: row.get("student_id").map_err(get_err)?,
        first_name: row.get("first_name").map_err(get_err)?,
        last_name: row.get("last_name").map_err(get_err)?,
        student_email: row.get("student_email").map_err(get_err)?,
        password_hash: row.get("password_hash").map_err(get_err)?,
        gender: row.get("gender").map_err(get_err)?,
        date_of_birth: parse_date(&date_of_birth)?,
        primary_diagnosis: row.get("primary_diagnosis").map_err(get_err)?,
        comorbidity: row.get("comorbidity").map_err(get_err)?,
        allergies: from_json(&allergies)?,
        medical_history: from_json(&medical_history)?,
        address: row.get("address").map_err(get_err)?,
        fathers_name: row.get("fathers_name").map_err(get_err)?,
        mothers_name: row.get("mothers_name").map_err(get_err)?,
        parent_email: row.get("parent_email").map_err(get_err)?,
        contact_number: row.get("contact_number").map_err(get_err)?,
        guardian_details: from_json(&guardian_details)?,
        programs: from_json(&programs)?,
        number_of_sessions: row.get("number_of_sessions").map_err(get_err)?,
        timings: row.get("timings").map_err(get_err)?,
        days_of_week: from_json(&days_of_week)?,
        session_type: parse_enum(&session_type)?,
        transport: row.get("transport").map_err(get_err)?,
        preferred_language: row.get("preferred_language").map_err(get_err)?,
        status: parse_enum(&status)?,
        is_approved: row.get("is_approved").map_err(get_err)?,
        enrollment_year: row.get("enrollment_year").map_err(get_err)?,
        primary_educator: parse_opt_uuid(row.get("primary_educator").map_err(get_err)?)?,
        secondary_educator: parse_opt_uuid(row.get("secondary_educator").map_err(get_err)?)?,
        avatar: avatar.as_deref().map(from_json).transpose()?,
        udid: from_json(&udid)?,
        strengths: from_json(&strengths)?,
        weaknesses: from_json(&weaknesses)?,
        comments: row.get("comments").map_err(get_err)?,
        refresh_token: row.get("refresh_token").map_err(get_err)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}
