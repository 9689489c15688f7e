// GPA calculator - a pure credit-weighted average over the fixed
// grade-to-point table, plus the thin wrapper that writes the result back
// onto the student row.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::enrollment::{enrollments_for_student, EnrollmentRecord, UNGRADED, WITHDRAWN};
use crate::error::{LedgerError, Result};
use crate::students::student_exists;

/// Fixed grade-to-point table. Not configurable. Unknown symbols map to 0.0
/// (and still carry credit weight in [`compute_gpa`] unless excluded).
pub fn grade_point(grade: &str) -> f64 {
    match grade.to_uppercase().as_str() {
        "A" => 4.0,
        "B+" => 3.5,
        "B" => 3.0,
        "C+" => 2.5,
        "C" => 2.0,
        "D+" => 1.5,
        "D" => 1.0,
        "F" => 0.0,
        _ => 0.0,
    }
}

fn counts_toward_gpa(grade: &str) -> bool {
    grade != UNGRADED && grade != WITHDRAWN
}

/// Credit-weighted grade-point average over a set of transcript rows.
///
/// Ungraded ("N/A") and withdrawn ("W") enrollments are excluded from both
/// numerator and denominator. Every other grade contributes its point value
/// times the subject's credits, and the credits to the weight - so an
/// unrecognized symbol drags the average down rather than vanishing.
/// Returns 0.0 when no enrollment qualifies.
///
/// Pure and deterministic; no side effects.
pub fn compute_gpa(records: &[EnrollmentRecord]) -> f64 {
    let mut total_points = 0.0;
    let mut total_credits: u32 = 0;

    for record in records {
        if counts_toward_gpa(&record.grade) {
            total_points += grade_point(&record.grade) * f64::from(record.credits);
            total_credits += record.credits;
        }
    }

    if total_credits == 0 {
        0.0
    } else {
        total_points / f64::from(total_credits)
    }
}

/// Recompute a student's GPA from their enrollments and persist the scalar
/// onto the student row. Idempotent for unchanged inputs: same value
/// computed, same value stored.
pub fn calculate_and_update_gpa(conn: &Connection, student_id: &str) -> Result<f64> {
    if !student_exists(conn, student_id)? {
        return Err(LedgerError::StudentNotFound(student_id.to_string()));
    }

    let records = enrollments_for_student(conn, student_id)?;
    let gpa = compute_gpa(&records);

    conn.execute(
        "UPDATE students SET gpa = ?1 WHERE student_id = ?2",
        params![gpa, student_id],
    )?;

    tracing::debug!(student_id, gpa, "gpa recalculated");
    Ok(gpa)
}

// ============================================================================
// FAILURE REPORTING
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCount {
    pub subject_name: String,
    pub failures: i64,
}

/// Subjects ranked by how many enrollments ended in an F.
pub fn most_failed_subjects(conn: &Connection, limit: u32) -> Result<Vec<FailureCount>> {
    let mut stmt = conn.prepare(
        "SELECT s.subject_name, COUNT(*) AS fail_count
         FROM enrollments e
         JOIN subjects s ON e.subject_id = s.subject_id
         WHERE e.grade = 'F'
         GROUP BY s.subject_name
         ORDER BY fail_count DESC
         LIMIT ?1",
    )?;

    let counts = stmt
        .query_map([limit], |row| {
            Ok(FailureCount {
                subject_name: row.get(0)?,
                failures: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(counts)
}

// ============================================================================
// TESTS
// ============================================================================
