use chrono::{NaiveDate, NaiveTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Fields supplied when registering (or re-registering) a student.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A row of the `students` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub registration_date: String,
    pub is_active: bool,
    /// Whether a face encoding is stored for this student.
    pub has_encoding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown attendance status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for AttendanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl ToSql for AttendanceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AttendanceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: ParseStatusError| FromSqlError::Other(Box::new(e)))
    }
}

/// One attendance mark to insert.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AttendanceStatus,
    pub recorded_by: Option<String>,
    pub notes: Option<String>,
}

/// An attendance row joined with its student, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRow {
    pub student_id: String,
    pub name: String,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AttendanceStatus,
    pub recorded_by: Option<String>,
    pub notes: Option<String>,
}

/// Per-department counts over a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentSummary {
    pub department: Option<String>,
    pub total_students: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
}

impl DepartmentSummary {
    /// Present rows as a share of all rows; `None` when nothing was recorded.
    pub fn present_percentage(&self) -> Option<f64> {
        let total = self.present + self.absent + self.late;
        (total > 0).then(|| self.present as f64 / total as f64 * 100.0)
    }
}
