use std::sync::Arc;

use chrono::Utc;
use rusqlite::{named_params, Row};
use uuid::Uuid;

use nurture_core::error::NurtureError;
use nurture_core::types::{Employee, Role};

use super::{
    from_json, millis_to_datetime, parse_date, parse_enum, parse_uuid, storage_err, to_json,
    OptionalExt,
};
use crate::db::Database;

const COLUMNS: &str = "id, employee_id, name, email, password_hash, gender, phone, designation,
    department, role, status, date_of_joining, avatar, refresh_token, created_at, updated_at";

/// Repository for staff accounts.
pub struct EmployeeRepository {
    db: Arc<Database>,
}

impl EmployeeRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, employee: &Employee) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| insert_employee(conn, employee))
    }

    /// Insert `employee`, promoting it to Admin if the table is empty.
    ///
    /// The count and the insert run in one transaction so two concurrent
    /// first sign-ups cannot both become Admin.
    pub fn insert_bootstrapping_admin(
        &self,
        employee: &Employee,
    ) -> Result<Employee, NurtureError> {
        self.db.with_transaction(|conn| {
            let existing: i64 = conn
                .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut employee = employee.clone();
            if existing == 0 {
                employee.role = Role::Admin;
            }
            insert_employee(conn, &employee)?;
            Ok(employee)
        })
    }

    /// Persist the profile fields and bump `updated_at`.
    ///
    /// Credentials are left alone: the refresh token only changes through
    /// [`Self::set_refresh_token`] and [`Self::rotate_refresh_token`].
    pub fn update(&self, employee: &Employee) -> Result<Employee, NurtureError> {
        let mut updated = employee.clone();
        updated.updated_at = Utc::now();

        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE employees SET
                    name = :name, email = :email, gender = :gender, phone = :phone, designation = :designation,
                    department = :department, role = :role, status = :status,
                    date_of_joining = :date_of_joining, avatar = :avatar,
                    updated_at = :updated_at
                 WHERE id = :id",
                named_params! {
                    ":id": updated.id.to_string(),
                    ":name": updated.name,
                    ":email": updated.email,
                    ":gender": updated.gender,
                    ":phone": updated.phone,
                    ":designation": updated.designation,
                    ":department": updated.department,
                    ":role": updated.role.as_str(),
                    ":status": updated.status.as_str(),
                    ":date_of_joining": updated.date_of_joining.map(|d| d.format("%Y-%m-%d").to_string()),
                    ":avatar": updated.avatar.as_ref().map(to_json).transpose()?,
                    ":updated_at": updated.updated_at.timestamp_millis(),
                },
            )
            .map_err(|e| storage_err("Failed to update employee", e))
        })?;

        if changed == 0 {
            return Err(NurtureError::NotFound(format!(
                "employee {}",
                employee.employee_id
            )));
        }
        Ok(updated)
    }

    pub fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), NurtureError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE employees SET refresh_token = ?1 WHERE id = ?2",
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
                    "UPDATE employees SET refresh_token = ?1 WHERE id = ?2 AND refresh_token = ?3",
                    rusqlite::params![new, id.to_string(), old],
                )
                .map_err(|e| storage_err("Failed to rotate refresh token", e))?;
            Ok(changed == 1)
        })
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Employee>, NurtureError> {
        self.find_one("id = ?1", &id.to_string())
    }

    pub fn find_by_employee_id(&self, employee_id: &str) -> Result<Option<Employee>, NurtureError> {
        self.find_one("employee_id = ?1", employee_id)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Employee>, NurtureError> {
        self.find_one("email = ?1", email)
    }

    fn find_one(&self, predicate: &str, value: &str) -> Result<Option<Employee>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM employees WHERE {}", COLUMNS, predicate))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![value], |row| Ok(row_to_employee(row)))
                .optional()
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// All employees, optionally restricted to one role, newest first.
    pub fn list(&self, role: Option<Role>) -> Result<Vec<Employee>, NurtureError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM employees
                     WHERE (?1 IS NULL OR role = ?1)
                     ORDER BY created_at DESC, rowid DESC",
                    COLUMNS
                ))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![role.map(|r| r.as_str())], |row| {
                    Ok(row_to_employee(row))
                })
                .map_err(|e| NurtureError::Storage(e.to_string()))?;

            let mut employees = Vec::new();
            for row in rows {
                employees.push(row.map_err(|e| NurtureError::Storage(e.to_string()))??);
            }
            Ok(employees)
        })
    }

    pub fn count(&self) -> Result<u64, NurtureError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))
                .map_err(|e| NurtureError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn insert_employee(conn: &rusqlite::Connection, employee: &Employee) -> Result<(), NurtureError> {
    conn.execute(
        &format!(
            "INSERT INTO employees ({}) VALUES (
                :id, :employee_id, :name, :email, :password_hash, :gender, :phone,
                :designation, :department, :role, :status, :date_of_joining, :avatar,
                :refresh_token, :created_at, :updated_at)",
            COLUMNS
        ),
        named_params! {
            ":id": employee.id.to_string(),
            ":employee_id": employee.employee_id,
            ":name": employee.name,
            ":email": employee.email,
            ":password_hash": employee.password_hash,
            ":gender": employee.gender,
            ":phone": employee.phone,
            ":designation": employee.designation,
            ":department": employee.department,
            ":role": employee.role.as_str(),
            ":status": employee.status.as_str(),
            ":date_of_joining": employee.date_of_joining.map(|d| d.format("%Y-%m-%d").to_string()),
            ":avatar": employee.avatar.as_ref().map(to_json).transpose()?,
            ":refresh_token": employee.refresh_token,
            ":created_at": employee.created_at.timestamp_millis(),
            ":updated_at": employee.updated_at.timestamp_millis(),
        },
    )
    .map_err(|e| storage_err("Failed to save employee", e))?;
    Ok(())
}

fn row_to_employee(row: &Row<'_>) -> Result<Employee, NurtureError> {
    let get_err = |e: rusqlite::Error| NurtureError::Storage(e.to_string());

    let id: String = row.get("id").map_err(get_err)?;
    let role: String = row.get("role").map_err(get_err)?;
    let status: String = row.get("status").map_err(get_err)?;
    let date_of_joining: Option<String> = row.get("date_of_joining").map_err(get_err)?;
    let avatar: Option<String> = row.get("avatar").map_err(get_err)?;
    let created_at: i64 = row.get("created_at").map_err(get_err)?;
    let updated_at: i64 = row.get("updated_at").map_err(get_err)?;

    Ok(Employee {
        id: parse_uuid(&id)?,
        employee_id: row.get("employee_id").map_err(get_err)?,
        name: row.get("name").map_err(get_err)?,
        email: row.get("email").map_err(get_err)?,
        password_hash: row.get("password_hash").map_err(get_err)?,
        gender: row.get("gender").map_err(get_err)?,
        phone: row.get("phone").map_err(get_err)?,
        designation: row.get("designation").map_err(get_err)?,
        department: row.get("department").map_err(get_err)?,
        role: parse_enum(&role)?,
        status: parse_enum(&status)?,
        date_of_joining: date_of_joining.as_deref().map(parse_date).transpose()?,
        avatar: avatar.as_deref().map(from_json).transpose()?,
        refresh_token: row.get("refresh_token").map_err(get_err)?,
        created_at: millis_to_datetime(created_at),
        updated_at: millis_to_datetime(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{make_db, make_employee};
    use nurture_core::types::EmployeeStatus;

    #[test]
    fn test_insert_and_find() {
        let repo = EmployeeRepository::new(make_db());
        let employee = make_employee("kavya@example.com", Role::Educator);
        repo.insert(&employee).unwrap();

        let found = repo.find_by_email("kavya@example.com").unwrap().unwrap();
        assert_eq!(found.id, employee.id);
        assert_eq!(found.role, Role::Educator);
        assert_eq!(found.department.as_deref(), Some("Therapy"));

        let by_eid = repo.find_by_employee_id(&employee.employee_id).unwrap().unwrap();
        assert_eq!(by_eid.id, employee.id);
        assert!(repo.find_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let repo = EmployeeRepository::new(make_db());
        repo.insert(&make_employee("dup@example.com", Role::Staff)).unwrap();
        let err = repo
            .insert(&make_employee("dup@example.com", Role::Staff))
            .unwrap_err();
        assert!(matches!(err, NurtureError::Duplicate(_)));
    }

    #[test]
    fn test_first_account_becomes_admin() {
        let repo = EmployeeRepository::new(make_db());
        let first = repo
            .insert_bootstrapping_admin(&make_employee("first@example.com", Role::Staff))
            .unwrap();
        let second = repo
            .insert_bootstrapping_admin(&make_employee("second@example.com", Role::Staff))
            .unwrap();

        assert_eq!(first.role, Role::Admin);
        assert_eq!(second.role, Role::Staff);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_update_status() {
        let repo = EmployeeRepository::new(make_db());
        let mut employee = make_employee("s@example.com", Role::Staff);
        repo.insert(&employee).unwrap();

        employee.status = EmployeeStatus::Inactive;
        repo.update(&employee).unwrap();
        let found = repo.find_by_id(employee.id).unwrap().unwrap();
        assert_eq!(found.status, EmployeeStatus::Inactive);
    }

    #[test]
    fn test_list_by_role() {
        let repo = EmployeeRepository::new(make_db());
        repo.insert(&make_employee("a@example.com", Role::Admin)).unwrap();
        repo.insert(&make_employee("e1@example.com", Role::Educator)).unwrap();
        repo.insert(&make_employee("e2@example.com", Role::Educator)).unwrap();

        assert_eq!(repo.list(None).unwrap().len(), 3);
        let educators = repo.list(Some(Role::Educator)).unwrap();
        assert_eq!(educators.len(), 2);
        assert!(educators.iter().all(|e| e.role == Role::Educator));
    }

    #[test]
    fn test_refresh_token_cleared() {
        let repo = EmployeeRepository::new(make_db());
        let employee = make_employee("r@example.com", Role::Staff);
        repo.insert(&employee).unwrap();
        repo.set_refresh_token(employee.id, Some("abc")).unwrap();
        repo.set_refresh_token(employee.id, None).unwrap();
        assert!(repo.find_by_id(employee.id).unwrap().unwrap().refresh_token.is_none());
    }

    #[test]
    fn test_update_keeps_stored_refresh_token() {
        let repo = EmployeeRepository::new(make_db());
        let mut stale = make_employee("k@example.com", Role::Educator);
        repo.insert(&stale).unwrap();
        repo.set_refresh_token(stale.id, Some("fresh")).unwrap();

        stale.refresh_token = Some("stale".to_string());
        stale.password_hash = "other".to_string();
        stale.phone = Some("555".to_string());
        repo.update(&stale).unwrap();

        let found = repo.find_by_id(stale.id).unwrap().unwrap();
        assert_eq!(found.refresh_token.as_deref(), Some("fresh"));
        assert_eq!(found.password_hash, "$2b$04$hash");
        assert_eq!(found.phone.as_deref(), Some("555"));
    }

    #[test]
    fn test_rotate_refresh_token_once() {
        let repo = EmployeeRepository::new(make_db());
        let employee = make_employee("rot@example.com", Role::Staff);
        repo.insert(&employee).unwrap();
        repo.set_refresh_token(employee.id, Some("r1")).unwrap();

        assert!(repo.rotate_refresh_token(employee.id, "r1", "r2").unwrap());
        assert!(!repo.rotate_refresh_token(employee.id, "r1", "r3").unwrap());
        let found = repo.find_by_id(employee.id).unwrap().unwrap();
        assert_eq!(found.refresh_token.as_deref(), Some("r2"));

        repo.set_refresh_token(employee.id, None).unwrap();
        assert!(!repo.rotate_refresh_token(employee.id, "r2", "r4").unwrap());
    }
}
