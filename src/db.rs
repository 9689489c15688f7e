// Storage layer - connection setup, schema, and the transactional helper
// every multi-step write goes through.

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, Transaction};

use crate::error::Result;

/// How many times a transactional unit is attempted when the store reports
/// busy/locked. Validation, NotFound, and Conflict failures are never retried.
const MAX_TX_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (grows linearly per attempt).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// How long a single statement may wait on a lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) a file-backed ledger database with the schema in place.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    setup_schema(&conn)?;
    Ok(conn)
}

/// Open a fresh in-memory ledger database. Used heavily by tests.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    setup_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

pub fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            gpa REAL NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects (
            subject_id TEXT PRIMARY KEY,
            subject_name TEXT NOT NULL,
            credits INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS prerequisites (
            subject_id TEXT NOT NULL,
            prerequisite_subject_id TEXT NOT NULL,
            PRIMARY KEY (subject_id, prerequisite_subject_id),
            FOREIGN KEY (subject_id) REFERENCES subjects(subject_id),
            FOREIGN KEY (prerequisite_subject_id) REFERENCES subjects(subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teaching_assignments (
            subject_id TEXT NOT NULL UNIQUE,
            teacher_id TEXT NOT NULL,
            room TEXT NOT NULL,
            schedule_day TEXT NOT NULL,
            schedule_time TEXT NOT NULL,
            FOREIGN KEY (subject_id) REFERENCES subjects(subject_id)
        )",
        [],
    )?;

    // UNIQUE(student_id, subject_id) closes the duplicate-enrollment race at
    // the storage level; the application-level check only shapes the error.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments (
            enrollment_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT 'N/A',
            UNIQUE (student_id, subject_id),
            FOREIGN KEY (student_id) REFERENCES students(student_id),
            FOREIGN KEY (subject_id) REFERENCES subjects(subject_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_scores (
            score_id INTEGER PRIMARY KEY AUTOINCREMENT,
            enrollment_id INTEGER NOT NULL,
            assignment_name TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY (enrollment_id) REFERENCES enrollments(enrollment_id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices (
            invoice_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            issue_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            total_amount REAL NOT NULL,
            status TEXT NOT NULL,
            FOREIGN KEY (student_id) REFERENCES students(student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoice_items (
            item_id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            FOREIGN KEY (invoice_id) REFERENCES invoices(invoice_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL,
            student_id TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            amount_paid REAL NOT NULL,
            payment_method TEXT NOT NULL,
            reference_code TEXT,
            FOREIGN KEY (invoice_id) REFERENCES invoices(invoice_id),
            FOREIGN KEY (student_id) REFERENCES students(student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS financial_aid (
            aid_id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            invoice_id INTEGER NOT NULL,
            aid_type TEXT NOT NULL,
            description TEXT,
            amount REAL NOT NULL,
            apply_date TEXT NOT NULL,
            FOREIGN KEY (student_id) REFERENCES students(student_id),
            FOREIGN KEY (invoice_id) REFERENCES invoices(invoice_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_subject ON enrollments(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_enrollment ON assignment_scores(enrollment_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_student ON invoices(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_semester ON invoices(semester_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_invoice ON transactions(invoice_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_student ON transactions(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_aid_student ON financial_aid(student_id)",
        [],
    )?;

    Ok(())
}

/// Run `op` inside a single transaction: begin, work, commit. Any error rolls
/// the whole unit back before it reaches the caller; no statement survives a
/// rollback. Busy/locked errors retry the entire unit a bounded number of
/// times with linear backoff.
pub fn with_tx<T, F>(conn: &mut Connection, mut op: F) -> Result<T>
where
    F: FnMut(&Transaction) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match run_once(conn, &mut op) {
            Err(err) if err.is_transient() && attempt < MAX_TX_ATTEMPTS => {
                tracing::warn!(attempt, error = %err, "transient storage error, retrying");
                thread::sleep(RETRY_BASE_DELAY * attempt);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn run_once<T, F>(conn: &mut Connection, op: &mut F) -> Result<T>
where
    F: FnMut(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Row-existence probe shared by the check halves of check-then-write paths.
pub(crate) fn exists<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    let mut stmt = conn.prepare(sql)?;
    let found = stmt.exists(params)?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use rusqlite::params;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        // Re-running setup against an initialized database must be a no-op.
        setup_schema(&conn).unwrap();
    }

    #[test]
    fn test_with_tx_commits_on_ok() {
        let mut conn = open_in_memory().unwrap();
        with_tx(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO students(student_id, name, status) VALUES (?1, ?2, ?3)",
                params!["S1", "Ada", "ENROLLED"],
            )?;
            Ok(())
        })
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_with_tx_rolls_back_on_err() {
        let mut conn = open_in_memory().unwrap();
        let result: Result<()> = with_tx(&mut conn, |tx| {
            tx.execute(
                "INSERT INTO students(student_id, name, status) VALUES (?1, ?2, ?3)",
                params!["S1", "Ada", "ENROLLED"],
            )?;
            Err(LedgerError::Validation("forced failure".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "rolled-back insert must not be observable");
    }

    #[test]
    fn test_file_backed_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let conn = open(&path).unwrap();
            conn.execute(
                "INSERT INTO students(student_id, name, status) VALUES (?1, ?2, ?3)",
                params!["S1", "Ada", "ENROLLED"],
            )
            .unwrap();
        }

        let conn = open(&path).unwrap();
        let name: String = conn
            .query_row(
                "SELECT name FROM students WHERE student_id = ?1",
                ["S1"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Ada");
    }
}
