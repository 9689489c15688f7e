// Student records - the slice of the student table the ledger owns:
// identity, enrollment status (drives billing eligibility), and the cached
// GPA written back by the GPA calculator.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{LedgerError, Result};

// ============================================================================
// STUDENT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudentStatus {
    /// Actively enrolled; eligible for semester billing
    Enrolled,

    /// Finished the program
    Graduated,

    /// Temporarily away; keeps records but is not billed
    OnLeave,

    /// Left the program
    Dropped,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Enrolled => "ENROLLED",
            StudentStatus::Graduated => "GRADUATED",
            StudentStatus::OnLeave => "ON_LEAVE",
            StudentStatus::Dropped => "DROPPED",
        }
    }

    pub fn parse(value: &str) -> Option<StudentStatus> {
        match value {
            "ENROLLED" => Some(StudentStatus::Enrolled),
            "GRADUATED" => Some(StudentStatus::Graduated),
            "ON_LEAVE" => Some(StudentStatus::OnLeave),
            "DROPPED" => Some(StudentStatus::Dropped),
            _ => None,
        }
    }
}

// ============================================================================
// STUDENT RECORD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub status: StudentStatus,
    /// Credit-weighted grade-point average, derived by the GPA calculator.
    /// 0.0 until the first recalculation.
    pub gpa: f64,
}

fn student_from_row(row: &Row) -> rusqlite::Result<Student> {
    let status_str: String = row.get(2)?;
    let status = StudentStatus::parse(&status_str).ok_or(rusqlite::Error::InvalidQuery)?;

    Ok(Student {
        id: row.get(0)?,
        name: row.get(1)?,
        status,
        gpa: row.get(3)?,
    })
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub fn add_student(conn: &Connection, id: &str, name: &str, status: StudentStatus) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "student id must not be blank".to_string(),
        ));
    }
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "student name must not be blank".to_string(),
        ));
    }

    let result = conn.execute(
        "INSERT INTO students(student_id, name, status, gpa) VALUES (?1, ?2, ?3, 0)",
        params![id, name, status.as_str()],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(LedgerError::StudentExists(id.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Student> {
    conn.query_row(
        "SELECT student_id, name, status, gpa FROM students WHERE student_id = ?1",
        [id],
        student_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::StudentNotFound(id.to_string()))
}

pub fn list_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt =
        conn.prepare("SELECT student_id, name, status, gpa FROM students ORDER BY student_id")?;

    let students = stmt
        .query_map([], student_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(students)
}

pub fn set_status(conn: &Connection, id: &str, status: StudentStatus) -> Result<()> {
    let updated = conn.execute(
        "UPDATE students SET status = ?1 WHERE student_id = ?2",
        params![status.as_str(), id],
    )?;

    if updated == 0 {
        return Err(LedgerError::StudentNotFound(id.to_string()));
    }

    tracing::debug!(student_id = id, status = status.as_str(), "status changed");
    Ok(())
}

pub(crate) fn student_exists(conn: &Connection, id: &str) -> Result<bool> {
    db::exists(conn, "SELECT 1 FROM students WHERE student_id = ?1", [id])
}

// ============================================================================
// TESTS
// ============================================================================
