//! Database schema migrations.
//!
//! Version 1 creates the employees, students, attendance, student_reports
//! and admin_notifications tables. List-valued and embedded fields are
//! stored as JSON text.

use rusqlite::Connection;
use tracing::info;

use nurture_core::error::NurtureError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), NurtureError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| NurtureError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| NurtureError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), NurtureError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS employees (
            id              TEXT PRIMARY KEY NOT NULL,
            employee_id     TEXT NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            gender          TEXT,
            phone           TEXT,
            designation     TEXT NOT NULL,
            department      TEXT,
            role            TEXT NOT NULL DEFAULT 'Staff'
                            CHECK (role IN ('Admin', 'Educator', 'Staff')),
            status          TEXT NOT NULL DEFAULT 'Active'
                            CHECK (status IN ('Active', 'Inactive')),
            date_of_joining TEXT,
            avatar          TEXT,
            refresh_token   TEXT,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_employees_role
            ON employees (role, created_at DESC);

        CREATE TABLE IF NOT EXISTS students (
            id                  TEXT PRIMARY KEY NOT NULL,
            student_id          TEXT NOT NULL UNIQUE,
            first_name          TEXT NOT NULL,
            last_name           TEXT NOT NULL,
            student_email       TEXT NOT NULL UNIQUE,
            password_hash       TEXT NOT NULL,
            gender              TEXT NOT NULL,
            date_of_birth       TEXT NOT NULL,
            primary_diagnosis   TEXT NOT NULL,
            comorbidity         TEXT,
            allergies           TEXT NOT NULL DEFAULT '[]',
            medical_history     TEXT NOT NULL DEFAULT '{}',
            address             TEXT NOT NULL,
            fathers_name        TEXT NOT NULL,
            mothers_name        TEXT NOT NULL,
            parent_email        TEXT NOT NULL,
            contact_number      TEXT NOT NULL,
            guardian_details    TEXT NOT NULL DEFAULT '{}',
            programs            TEXT NOT NULL DEFAULT '[]',
            number_of_sessions  INTEGER,
            timings             TEXT,
            days_of_week        TEXT NOT NULL DEFAULT '[]',
            session_type        TEXT NOT NULL DEFAULT 'Offline'
                                CHECK (session_type IN ('Offline', 'Online')),
            transport           INTEGER NOT NULL DEFAULT 0,
            preferred_language  TEXT,
            status              TEXT NOT NULL DEFAULT 'Active'
                                CHECK (status IN ('Active', 'Inactive', 'Graduated')),
            is_approved         INTEGER NOT NULL DEFAULT 0,
            enrollment_year     INTEGER,
            primary_educator    TEXT REFERENCES employees(id) ON DELETE SET NULL,
            secondary_educator  TEXT REFERENCES employees(id) ON DELETE SET NULL,
            avatar              TEXT,
            udid                TEXT NOT NULL DEFAULT '{\"isAvailable\":false}',
            strengths           TEXT NOT NULL DEFAULT '[]',
            weaknesses          TEXT NOT NULL DEFAULT '[]',
            comments            TEXT,
            refresh_token       TEXT,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_students_approval
            ON students (is_approved, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_students_primary_educator
            ON students (primary_educator)
            WHERE primary_educator IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_students_secondary_educator
            ON students (secondary_educator)
            WHERE secondary_educator IS NOT NULL;

        CREATE TABLE IF NOT EXISTS attendance (
            id              TEXT PRIMARY KEY NOT NULL,
            student_id      TEXT NOT NULL UNIQUE
                            REFERENCES students(id) ON DELETE CASCADE,
            educator_id     TEXT REFERENCES employees(id) ON DELETE SET NULL,
            report          TEXT NOT NULL DEFAULT '[]',
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS student_reports (
            id                  TEXT PRIMARY KEY NOT NULL,
            student_id          TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
            author_id           TEXT REFERENCES employees(id) ON DELETE SET NULL,
            program_feedback    TEXT,
            feedback            TEXT NOT NULL,
            assessment_report   TEXT,
            created_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_student_reports_student
            ON student_reports (student_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS admin_notifications (
            id          TEXT PRIMARY KEY NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            kind        TEXT NOT NULL
                        CHECK (kind IN ('STUDENT_REGISTRATION', 'GENERAL')),
            student_id  TEXT REFERENCES students(id) ON DELETE CASCADE,
            status      TEXT NOT NULL DEFAULT 'PENDING'
                        CHECK (status IN ('PENDING', 'APPROVED', 'READ')),
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_admin_notifications_status
            ON admin_notifications (status, created_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| NurtureError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
