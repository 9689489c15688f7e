// Course catalog - subjects, their teaching assignment, and prerequisite
// edges. A subject and its assignment form one aggregate: they are always
// written together in a single transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{self, with_tx};
use crate::error::{LedgerError, Result};

// ============================================================================
// CATALOG TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    /// Credit weight used by the GPA calculation. Always positive.
    pub credits: u32,
}

/// Teacher/room/schedule attached to a subject. One-to-one with [`Subject`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingAssignment {
    pub teacher_id: String,
    pub room: String,
    pub day: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectWithAssignment {
    pub subject: Subject,
    pub assignment: Option<TeachingAssignment>,
}

fn subject_from_row(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        credits: row.get(2)?,
    })
}

fn validate_subject(subject: &Subject) -> Result<()> {
    if subject.id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "subject id must not be blank".to_string(),
        ));
    }
    if subject.name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "subject name must not be blank".to_string(),
        ));
    }
    if subject.credits == 0 {
        return Err(LedgerError::Validation(
            "credits must be positive".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// WRITE OPERATIONS
// ============================================================================

/// Insert a subject and its teaching assignment as one atomic unit. Failure
/// of either half leaves neither row behind.
pub fn add_subject(
    conn: &mut Connection,
    subject: &Subject,
    assignment: &TeachingAssignment,
) -> Result<()> {
    validate_subject(subject)?;

    with_tx(conn, |tx| {
        if db::exists(
            tx,
            "SELECT 1 FROM subjects WHERE subject_id = ?1",
            [subject.id.as_str()],
        )? {
            return Err(LedgerError::SubjectExists(subject.id.clone()));
        }

        tx.execute(
            "INSERT INTO subjects(subject_id, subject_name, credits) VALUES (?1, ?2, ?3)",
            params![subject.id, subject.name, subject.credits],
        )?;

        tx.execute(
            "INSERT INTO teaching_assignments(subject_id, teacher_id, room, schedule_day, schedule_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                subject.id,
                assignment.teacher_id,
                assignment.room,
                assignment.day,
                assignment.time,
            ],
        )?;

        Ok(())
    })
}

/// Update a subject and its teaching assignment as one atomic unit. If the
/// assignment row does not exist yet, the update falls back to an insert.
pub fn update_subject_and_assignment(
    conn: &mut Connection,
    subject: &Subject,
    assignment: &TeachingAssignment,
) -> Result<()> {
    validate_subject(subject)?;

    with_tx(conn, |tx| {
        let updated = tx.execute(
            "UPDATE subjects SET subject_name = ?1, credits = ?2 WHERE subject_id = ?3",
            params![subject.name, subject.credits, subject.id],
        )?;
        if updated == 0 {
            return Err(LedgerError::SubjectNotFound(subject.id.clone()));
        }

        let assigned = tx.execute(
            "UPDATE teaching_assignments
             SET teacher_id = ?1, room = ?2, schedule_day = ?3, schedule_time = ?4
             WHERE subject_id = ?5",
            params![
                assignment.teacher_id,
                assignment.room,
                assignment.day,
                assignment.time,
                subject.id,
            ],
        )?;
        if assigned == 0 {
            tx.execute(
                "INSERT INTO teaching_assignments(subject_id, teacher_id, room, schedule_day, schedule_time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subject.id,
                    assignment.teacher_id,
                    assignment.room,
                    assignment.day,
                    assignment.time,
                ],
            )?;
        }

        Ok(())
    })
}

/// Replace the full prerequisite set of a subject: delete every existing
/// edge, then insert the new set, atomically. An empty list clears the set.
/// Self-references and cycles are accepted; the catalog records edges, it
/// does not police the graph.
pub fn set_prerequisites(
    conn: &mut Connection,
    subject_id: &str,
    prereq_ids: &[&str],
) -> Result<()> {
    with_tx(conn, |tx| {
        if !db::exists(
            tx,
            "SELECT 1 FROM subjects WHERE subject_id = ?1",
            [subject_id],
        )? {
            return Err(LedgerError::SubjectNotFound(subject_id.to_string()));
        }

        tx.execute(
            "DELETE FROM prerequisites WHERE subject_id = ?1",
            [subject_id],
        )?;

        let mut stmt = tx.prepare(
            "INSERT INTO prerequisites(subject_id, prerequisite_subject_id) VALUES (?1, ?2)",
        )?;
        for prereq_id in prereq_ids {
            stmt.execute(params![subject_id, prereq_id])?;
        }

        Ok(())
    })
}

// ============================================================================
// READ OPERATIONS
// ============================================================================

pub fn get_subject(conn: &Connection, id: &str) -> Result<Subject> {
    conn.query_row(
        "SELECT subject_id, subject_name, credits FROM subjects WHERE subject_id = ?1",
        [id],
        subject_from_row,
    )
    .optional()?
    .ok_or_else(|| LedgerError::SubjectNotFound(id.to_string()))
}

pub fn get_subject_with_assignment(conn: &Connection, id: &str) -> Result<SubjectWithAssignment> {
    conn.query_row(
        "SELECT s.subject_id, s.subject_name, s.credits,
                ta.teacher_id, ta.room, ta.schedule_day, ta.schedule_time
         FROM subjects s
         LEFT JOIN teaching_assignments ta ON s.subject_id = ta.subject_id
         WHERE s.subject_id = ?1",
        [id],
        |row| {
            let subject = subject_from_row(row)?;
            let teacher_id: Option<String> = row.get(3)?;
            let assignment = match teacher_id {
                Some(teacher_id) => Some(TeachingAssignment {
                    teacher_id,
                    room: row.get(4)?,
                    day: row.get(5)?,
                    time: row.get(6)?,
                }),
                None => None,
            };
            Ok(SubjectWithAssignment {
                subject,
                assignment,
            })
        },
    )
    .optional()?
    .ok_or_else(|| LedgerError::SubjectNotFound(id.to_string()))
}

pub fn list_subjects(conn: &Connection) -> Result<Vec<Subject>> {
    let mut stmt =
        conn.prepare("SELECT subject_id, subject_name, credits FROM subjects ORDER BY subject_id")?;

    let subjects = stmt
        .query_map([], subject_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(subjects)
}

pub fn prerequisites_of(conn: &Connection, subject_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT prerequisite_subject_id FROM prerequisites
         WHERE subject_id = ?1
         ORDER BY prerequisite_subject_id",
    )?;

    let ids = stmt
        .query_map([subject_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(ids)
}

pub(crate) fn subject_exists(conn: &Connection, id: &str) -> Result<bool> {
    db::exists(conn, "SELECT 1 FROM subjects WHERE subject_id = ?1", [id])
}

// ============================================================================
// TESTS
// ============================================================================
