use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NurtureError;

// =============================================================================
// Enums
// =============================================================================

/// Staff role, in decreasing order of privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Educator,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Educator => "Educator",
            Role::Staff => "Staff",
        }
    }
}

impl FromStr for Role {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Admin" => Ok(Role::Admin),
            "Educator" => Ok(Role::Educator),
            "Staff" => Ok(Role::Staff),
            other => Err(NurtureError::Validation(format!("Invalid role '{}'", other))),
        }
    }
}

/// Enrollment state of a student.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudentStatus {
    #[default]
    Active,
    Inactive,
    Graduated,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "Active",
            StudentStatus::Inactive => "Inactive",
            StudentStatus::Graduated => "Graduated",
        }
    }
}

impl FromStr for StudentStatus {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(StudentStatus::Active),
            "Inactive" => Ok(StudentStatus::Inactive),
            "Graduated" => Ok(StudentStatus::Graduated),
            other => Err(NurtureError::Validation(format!(
                "Invalid student status '{}'",
                other
            ))),
        }
    }
}

/// Employment state of a staff member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "Active",
            EmployeeStatus::Inactive => "Inactive",
        }
    }
}

impl FromStr for EmployeeStatus {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(EmployeeStatus::Active),
            "Inactive" => Ok(EmployeeStatus::Inactive),
            other => Err(NurtureError::Validation(format!(
                "Invalid employee status '{}'",
                other
            ))),
        }
    }
}

/// How a student attends sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    #[default]
    Offline,
    Online,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Offline => "Offline",
            SessionType::Online => "Online",
        }
    }
}

impl FromStr for SessionType {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Offline" => Ok(SessionType::Offline),
            "Online" => Ok(SessionType::Online),
            other => Err(NurtureError::Validation(format!(
                "Invalid session type '{}'",
                other
            ))),
        }
    }
}

/// Programs a student can be enrolled in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Program {
    Multi,
    #[serde(rename = "Job Readiness")]
    JobReadiness,
    Vocation,
    Spruha,
    Suyog,
    Sameti,
    Shaale,
    Siddhi,
    Sattva,
}

impl Program {
    pub const ALL: [Program; 9] = [
        Program::Multi,
        Program::JobReadiness,
        Program::Vocation,
        Program::Spruha,
        Program::Suyog,
        Program::Sameti,
        Program::Shaale,
        Program::Siddhi,
        Program::Sattva,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Program::Multi => "Multi",
            Program::JobReadiness => "Job Readiness",
            Program::Vocation => "Vocation",
            Program::Spruha => "Spruha",
            Program::Suyog => "Suyog",
            Program::Sameti => "Sameti",
            Program::Shaale => "Shaale",
            Program::Siddhi => "Siddhi",
            Program::Sattva => "Sattva",
        }
    }
}

impl FromStr for Program {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Program::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| NurtureError::Validation(format!("Invalid program '{}'", s)))
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single day's attendance mark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceCode {
    #[serde(rename = "P")]
    Present,
    #[serde(rename = "A")]
    Absent,
    #[default]
    #[serde(rename = "$")]
    Unmarked,
}

impl AttendanceCode {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'P' => Some(AttendanceCode::Present),
            'A' => Some(AttendanceCode::Absent),
            '$' => Some(AttendanceCode::Unmarked),
            _ => None,
        }
    }
}

/// Calendar month, serialised as its three-letter abbreviation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// 1-based month number.
    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    pub fn from_number(n: u32) -> Option<Self> {
        Month::ALL.get(n.checked_sub(1)? as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    /// Number of days in this month of `year`.
    pub fn days_in(&self, year: i32) -> u32 {
        let (next_year, next_month) = if *self == Month::Dec {
            (year + 1, 1)
        } else {
            (year, self.number() + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(31)
    }
}

impl FromStr for Month {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Month::ALL
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| NurtureError::Validation(format!("Invalid month '{}'", s)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    StudentRegistration,
    General,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::StudentRegistration => "STUDENT_REGISTRATION",
            NotificationKind::General => "GENERAL",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT_REGISTRATION" => Ok(NotificationKind::StudentRegistration),
            "GENERAL" => Ok(NotificationKind::General),
            other => Err(NurtureError::Validation(format!(
                "Invalid notification kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Approved,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Approved => "APPROVED",
            NotificationStatus::Read => "READ",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = NurtureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "APPROVED" => Ok(NotificationStatus::Approved),
            "READ" => Ok(NotificationStatus::Read),
            other => Err(NurtureError::Validation(format!(
                "Invalid notification status '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Embedded documents
// =============================================================================

/// A file stored on the media host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub public_id: String,
    pub secure_url: String,
}

/// Disability identification document reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Udid {
    pub is_available: bool,
    #[serde(default, rename = "public_id")]
    pub public_id: String,
    #[serde(default, rename = "secure_url")]
    pub secure_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalHistory {
    pub medications: Vec<String>,
    pub surgeries: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuardianDetails {
    pub name: Option<String>,
    pub relation: Option<String>,
    pub contact_number: Option<String>,
    pub parent_email: Option<String>,
}

// =============================================================================
// Records
// =============================================================================

/// A student (or the guardian account acting for them).
///
/// `password_hash` and `refresh_token` are never serialised, so a `Student`
/// can be returned from handlers as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    #[serde(rename = "StudentId")]
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub gender: String,
    pub date_of_birth: NaiveDate,
    pub primary_diagnosis: String,
    pub comorbidity: Option<String>,
    pub allergies: Vec<String>,
    pub medical_history: MedicalHistory,
    pub address: String,
    pub fathers_name: String,
    pub mothers_name: String,
    pub parent_email: String,
    pub contact_number: String,
    pub guardian_details: GuardianDetails,
    pub programs: Vec<Program>,
    pub number_of_sessions: Option<u32>,
    pub timings: Option<String>,
    pub days_of_week: Vec<String>,
    pub session_type: SessionType,
    pub transport: bool,
    pub preferred_language: Option<String>,
    pub status: StudentStatus,
    pub is_approved: bool,
    pub enrollment_year: Option<i32>,
    pub primary_educator: Option<Uuid>,
    pub secondary_educator: Option<Uuid>,
    pub avatar: Option<MediaAsset>,
    #[serde(rename = "UDID")]
    pub udid: Udid,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub comments: Option<String>,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A staff member: administrator, educator or general staff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Uuid,
    pub employee_id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub designation: String,
    pub department: Option<String>,
    pub role: Role,
    pub status: EmployeeStatus,
    pub date_of_joining: Option<NaiveDate>,
    pub avatar: Option<MediaAsset>,
    #[serde(skip_serializing, default)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The subset of an employee shown when a reference is populated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducatorSummary {
    pub id: Uuid,
    pub employee_id: String,
    pub name: String,
    pub designation: String,
    pub email: String,
}

impl From<&Employee> for EducatorSummary {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id,
            employee_id: e.employee_id.clone(),
            name: e.name.clone(),
            designation: e.designation.clone(),
            email: e.email.clone(),
        }
    }
}

/// One month of day-by-day attendance. `status[i]` is day `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyAttendance {
    pub year: i32,
    pub month: Month,
    pub status: Vec<AttendanceCode>,
}

impl MonthlyAttendance {
    /// A month with every day unmarked.
    pub fn new(year: i32, month: Month) -> Self {
        Self {
            year,
            month,
            status: vec![AttendanceCode::Unmarked; month.days_in(year) as usize],
        }
    }

    pub fn summary(&self) -> AttendanceSummary {
        let mut summary = AttendanceSummary {
            year: self.year,
            month: self.month,
            present: 0,
            absent: 0,
            unmarked: 0,
            percentage: None,
        };
        for code in &self.status {
            match code {
                AttendanceCode::Present => summary.present += 1,
                AttendanceCode::Absent => summary.absent += 1,
                AttendanceCode::Unmarked => summary.unmarked += 1,
            }
        }
        let marked = summary.present + summary.absent;
        if marked > 0 {
            summary.percentage = Some(summary.present as f64 * 100.0 / marked as f64);
        }
        summary
    }
}

/// Per-month attendance counts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub year: i32,
    pub month: Month,
    pub present: u32,
    pub absent: u32,
    pub unmarked: u32,
    /// Present over marked days, `None` when nothing is marked yet.
    pub percentage: Option<f64>,
}

/// A student's attendance record. There is at most one per student.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub student: Uuid,
    pub educator: Option<Uuid>,
    pub report: Vec<MonthlyAttendance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(student: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            student,
            educator: None,
            report: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the mark for `date`, creating the month entry if needed.
    pub fn mark(&mut self, date: NaiveDate, code: AttendanceCode) {
        let year = date.year();
        let month = Month::from_number(date.month()).unwrap_or(Month::Jan);
        let index = date.day0() as usize;

        let pos = match self
            .report
            .iter()
            .position(|m| m.year == year && m.month == month)
        {
            Some(pos) => pos,
            None => {
                self.report.push(MonthlyAttendance::new(year, month));
                self.report.sort_by_key(|m| (m.year, m.month));
                self.report
                    .iter()
                    .position(|m| m.year == year && m.month == month)
                    .unwrap_or(0)
            }
        };

        let entry = &mut self.report[pos];
        if entry.status.len() <= index {
            entry.status.resize(index + 1, AttendanceCode::Unmarked);
        }
        entry.status[index] = code;
        self.updated_at = Utc::now();
    }

    pub fn month(&self, year: i32, month: Month) -> Option<&MonthlyAttendance> {
        self.report
            .iter()
            .find(|m| m.year == year && m.month == month)
    }

    pub fn summaries(&self) -> Vec<AttendanceSummary> {
        self.report.iter().map(MonthlyAttendance::summary).collect()
    }
}

/// A written progress report about a student.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub id: Uuid,
    pub student: Uuid,
    pub author: Option<Uuid>,
    pub program_feedback: Option<String>,
    pub feedback: String,
    pub assessment_report: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Message shown on the admin dashboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub student: Option<Uuid>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminNotification {
    /// The notification raised when a student signs up.
    pub fn student_registration(student: &Student) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: "New Student Registration".to_string(),
            message: format!(
                "New student {} has registered. Please review and approve.",
                student.full_name()
            ),
            kind: NotificationKind::StudentRegistration,
            student: Some(student.id),
            status: NotificationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_round_trip_names() {
        for program in Program::ALL {
            assert_eq!(program.as_str().parse::<Program>().unwrap(), program);
        }
        assert!("Art".parse::<Program>().is_err());
        assert_eq!(
            serde_json::to_string(&Program::JobReadiness).unwrap(),
            "\"Job Readiness\""
        );
    }

    #[test]
    fn test_month_days() {
        assert_eq!(Month::Jan.days_in(2025), 31);
        assert_eq!(Month::Feb.days_in(2024), 29);
        assert_eq!(Month::Feb.days_in(2025), 28);
        assert_eq!(Month::Apr.days_in(2025), 30);
        assert_eq!(Month::Dec.days_in(2025), 31);
        assert_eq!(Month::from_number(12), Some(Month::Dec));
        assert_eq!(Month::from_number(0), None);
        assert_eq!(Month::from_number(13), None);
        assert_eq!("sep".parse::<Month>().unwrap(), Month::Sep);
    }

    #[test]
    fn test_attendance_code_serialization() {
        let codes = vec![
            AttendanceCode::Present,
            AttendanceCode::Absent,
            AttendanceCode::Unmarked,
        ];
        assert_eq!(serde_json::to_string(&codes).unwrap(), r#"["P","A","$"]"#);
        assert_eq!(AttendanceCode::from_char('A'), Some(AttendanceCode::Absent));
        assert_eq!(AttendanceCode::from_char('x'), None);
    }

    #[test]
    fn test_mark_creates_sized_month() {
        let mut record = AttendanceRecord::new(Uuid::new_v4());
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        record.mark(date, AttendanceCode::Present);

        let feb = record.month(2024, Month::Feb).unwrap();
        assert_eq!(feb.status.len(), 29);
        assert_eq!(feb.status[9], AttendanceCode::Present);
        assert_eq!(feb.status[0], AttendanceCode::Unmarked);
    }

    #[test]
    fn test_mark_keeps_months_ordered() {
        let mut record = AttendanceRecord::new(Uuid::new_v4());
        record.mark(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(), AttendanceCode::Absent);
        record.mark(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), AttendanceCode::Present);
        record.mark(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(), AttendanceCode::Present);

        let keys: Vec<(i32, Month)> = record.report.iter().map(|m| (m.year, m.month)).collect();
        assert_eq!(
            keys,
            vec![(2024, Month::Dec), (2025, Month::Jan), (2025, Month::Mar)]
        );
    }

    #[test]
    fn test_remark_overwrites_day() {
        let mut record = AttendanceRecord::new(Uuid::new_v4());
        let date = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        record.mark(date, AttendanceCode::Absent);
        record.mark(date, AttendanceCode::Present);

        assert_eq!(record.report.len(), 1);
        let summary = record.report[0].summary();
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 0);
        assert_eq!(summary.unmarked, 29);
    }

    #[test]
    fn test_summary_percentage() {
        let mut month = MonthlyAttendance::new(2025, Month::Jun);
        assert_eq!(month.summary().percentage, None);

        month.status[0] = AttendanceCode::Present;
        month.status[1] = AttendanceCode::Present;
        month.status[2] = AttendanceCode::Present;
        month.status[3] = AttendanceCode::Absent;
        let summary = month.summary();
        assert_eq!(summary.present, 3);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.percentage, Some(75.0));
    }

    #[test]
    fn test_notification_serializes_type_field() {
        let n = AdminNotification {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            message: "m".to_string(),
            kind: NotificationKind::StudentRegistration,
            student: None,
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "STUDENT_REGISTRATION");
        assert_eq!(json["status"], "PENDING");
    }
}
