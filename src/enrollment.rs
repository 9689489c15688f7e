// Enrollment & grading ledger - the link between one student and one
// subject, its final grade, and the per-assignment scores hanging off it.
// Enrollments are created once and never deleted; only grade and score
// operations mutate them afterward.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::catalog::subject_exists;
use crate::db::{self, with_tx};
use crate::error::{LedgerError, Result};
use crate::students::student_exists;

/// Grade sentinel carried by every enrollment until a final grade is set.
pub const UNGRADED: &str = "N/A";

/// Withdrawal marker. Excluded from GPA weighting like [`UNGRADED`].
pub const WITHDRAWN: &str = "W";

// ============================================================================
// RECORD TYPES
// ============================================================================

/// One row of a student's transcript: the enrollment joined with its subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub enrollment_id: i64,
    pub subject_id: String,
    pub subject_name: String,
    pub credits: u32,
    pub grade: String,
}

/// One row of a subject's roster: the enrollment joined with its student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRecord {
    pub enrollment_id: i64,
    pub student_id: String,
    pub student_name: String,
    pub grade: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentScore {
    pub score_id: i64,
    pub enrollment_id: i64,
    pub name: String,
    pub score: f64,
    pub max_score: f64,
    pub recorded_at: String,
}

// ============================================================================
// ENROLLMENT
// ============================================================================

/// Enroll a student in a subject. Returns the new enrollment id. The pair
/// must not already exist; the UNIQUE index backstops the pre-check, so two
/// racing callers cannot both succeed.
pub fn enroll(conn: &mut Connection, student_id: &str, subject_id: &str) -> Result<i64> {
    with_tx(conn, |tx| {
        if !student_exists(tx, student_id)? {
            return Err(LedgerError::StudentNotFound(student_id.to_string()));
        }
        if !subject_exists(tx, subject_id)? {
            return Err(LedgerError::SubjectNotFound(subject_id.to_string()));
        }
        if db::exists(
            tx,
            "SELECT 1 FROM enrollments WHERE student_id = ?1 AND subject_id = ?2",
            params![student_id, subject_id],
        )? {
            return Err(already_enrolled(student_id, subject_id));
        }

        let result = tx.execute(
            "INSERT INTO enrollments(student_id, subject_id, grade) VALUES (?1, ?2, ?3)",
            params![student_id, subject_id, UNGRADED],
        );

        match result {
            Ok(_) => Ok(tx.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(already_enrolled(student_id, subject_id))
            }
            Err(e) => Err(e.into()),
        }
    })
}

fn already_enrolled(student_id: &str, subject_id: &str) -> LedgerError {
    tracing::warn!(student_id, subject_id, "duplicate enrollment rejected");
    LedgerError::AlreadyEnrolled {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
    }
}

/// Overwrite the final grade of an enrollment. The grade is trimmed and
/// upper-cased but otherwise free text; unknown symbols are stored as-is.
/// GPA is not recomputed here - callers invoke the GPA calculator afterward.
pub fn record_final_grade(conn: &Connection, enrollment_id: i64, grade: &str) -> Result<()> {
    let grade = grade.trim().to_uppercase();
    if grade.is_empty() {
        return Err(LedgerError::Validation(
            "grade must not be blank".to_string(),
        ));
    }

    let updated = conn.execute(
        "UPDATE enrollments SET grade = ?1 WHERE enrollment_id = ?2",
        params![grade, enrollment_id],
    )?;

    if updated == 0 {
        return Err(LedgerError::EnrollmentNotFound(enrollment_id));
    }

    tracing::debug!(enrollment_id, grade = %grade, "final grade recorded");
    Ok(())
}

// ============================================================================
// ASSIGNMENT SCORES
// ============================================================================

fn validate_score(name: &str, score: f64, max_score: f64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "assignment name must not be blank".to_string(),
        ));
    }
    if !score.is_finite() || !max_score.is_finite() {
        return Err(LedgerError::Validation(
            "score and max score must be finite".to_string(),
        ));
    }
    if max_score <= 0.0 {
        return Err(LedgerError::Validation(
            "max score must be positive".to_string(),
        ));
    }
    if score < 0.0 {
        return Err(LedgerError::Validation(
            "score must not be negative".to_string(),
        ));
    }
    if score > max_score {
        return Err(LedgerError::Validation(format!(
            "score {} exceeds max score {}",
            score, max_score
        )));
    }
    Ok(())
}

pub fn record_assignment_score(
    conn: &Connection,
    enrollment_id: i64,
    name: &str,
    score: f64,
    max_score: f64,
) -> Result<i64> {
    validate_score(name, score, max_score)?;

    if !db::exists(
        conn,
        "SELECT 1 FROM enrollments WHERE enrollment_id = ?1",
        [enrollment_id],
    )? {
        return Err(LedgerError::EnrollmentNotFound(enrollment_id));
    }

    let recorded_at = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO assignment_scores(enrollment_id, assignment_name, score, max_score, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![enrollment_id, name, score, max_score, recorded_at],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn update_assignment_score(
    conn: &Connection,
    score_id: i64,
    name: &str,
    score: f64,
    max_score: f64,
) -> Result<()> {
    validate_score(name, score, max_score)?;

    let updated = conn.execute(
        "UPDATE assignment_scores SET assignment_name = ?1, score = ?2, max_score = ?3
         WHERE score_id = ?4",
        params![name, score, max_score, score_id],
    )?;

    if updated == 0 {
        return Err(LedgerError::ScoreNotFound(score_id));
    }
    Ok(())
}

pub fn delete_assignment_score(conn: &Connection, score_id: i64) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM assignment_scores WHERE score_id = ?1",
        [score_id],
    )?;

    if deleted == 0 {
        return Err(LedgerError::ScoreNotFound(score_id));
    }
    Ok(())
}

// ============================================================================
// LISTING PROJECTIONS
// ============================================================================

/// A student's transcript rows, ordered by subject id.
pub fn enrollments_for_student(conn: &Connection, student_id: &str) -> Result<Vec<EnrollmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT e.enrollment_id, s.subject_id, s.subject_name, s.credits, e.grade
         FROM enrollments e
         JOIN subjects s ON e.subject_id = s.subject_id
         WHERE e.student_id = ?1
         ORDER BY s.subject_id",
    )?;

    let records = stmt
        .query_map([student_id], enrollment_record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

/// A subject's roster rows, ordered by student name.
pub fn enrollments_for_subject(conn: &Connection, subject_id: &str) -> Result<Vec<RosterRecord>> {
    let mut stmt = conn.prepare(
        "SELECT e.enrollment_id, st.student_id, st.name, e.grade
         FROM enrollments e
         JOIN students st ON e.student_id = st.student_id
         WHERE e.subject_id = ?1
         ORDER BY st.name",
    )?;

    let records = stmt
        .query_map([subject_id], |row| {
            Ok(RosterRecord {
                enrollment_id: row.get(0)?,
                student_id: row.get(1)?,
                student_name: row.get(2)?,
                grade: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

pub fn scores_for_enrollment(conn: &Connection, enrollment_id: i64) -> Result<Vec<AssignmentScore>> {
    let mut stmt = conn.prepare(
        "SELECT score_id, enrollment_id, assignment_name, score, max_score, recorded_at
         FROM assignment_scores
         WHERE enrollment_id = ?1
         ORDER BY recorded_at DESC, score_id DESC",
    )?;

    let scores = stmt
        .query_map([enrollment_id], |row| {
            Ok(AssignmentScore {
                score_id: row.get(0)?,
                enrollment_id: row.get(1)?,
                name: row.get(2)?,
                score: row.get(3)?,
                max_score: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(scores)
}

fn enrollment_record_from_row(row: &Row) -> rusqlite::Result<EnrollmentRecord> {
    Ok(EnrollmentRecord {
        enrollment_id: row.get(0)?,
        subject_id: row.get(1)?,
        subject_name: row.get(2)?,
        credits: row.get(3)?,
        grade: row.get(4)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
