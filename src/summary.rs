// Financial summary aggregator - read-only projections over invoices and
// transactions. Everything here is recomputed on each call; nothing is
// cached. Per-student sums come from one grouped pass rather than a query
// per student.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// PER-STUDENT SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceSummary {
    pub student_id: String,
    pub student_name: String,
    pub total_due: f64,
    pub total_paid: f64,
}

impl FinanceSummary {
    pub fn balance(&self) -> f64 {
        self.total_due - self.total_paid
    }

    /// "PAID" once the balance is fully covered, "PENDING" otherwise.
    pub fn status(&self) -> &'static str {
        if self.balance() <= 0.0 {
            "PAID"
        } else {
            "PENDING"
        }
    }
}

/// Due/paid totals for every student, ordered by student id. Computed in a
/// single grouped aggregation pass; students with no invoices or payments
/// appear with zeros.
pub fn all_student_finance_summaries(conn: &Connection) -> Result<Vec<FinanceSummary>> {
    let mut stmt = conn.prepare(
        "SELECT s.student_id, s.name,
                COALESCE(due.total_due, 0) AS total_due,
                COALESCE(paid.total_paid, 0) AS total_paid
         FROM students s
         LEFT JOIN (
             SELECT student_id, SUM(total_amount) AS total_due
             FROM invoices GROUP BY student_id
         ) due ON due.student_id = s.student_id
         LEFT JOIN (
             SELECT student_id, SUM(amount_paid) AS total_paid
             FROM transactions GROUP BY student_id
         ) paid ON paid.student_id = s.student_id
         ORDER BY s.student_id",
    )?;

    let summaries = stmt
        .query_map([], |row| {
            Ok(FinanceSummary {
                student_id: row.get(0)?,
                student_name: row.get(1)?,
                total_due: row.get(2)?,
                total_paid: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(summaries)
}

// ============================================================================
// FLEET-WIDE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialReport {
    pub total_due: f64,
    pub total_paid: f64,
    pub transaction_count: i64,
}

impl FinancialReport {
    pub fn net_balance(&self) -> f64 {
        self.total_due - self.total_paid
    }
}

pub fn financial_summary_report(conn: &Connection) -> Result<FinancialReport> {
    let report = conn.query_row(
        "SELECT (SELECT COALESCE(SUM(total_amount), 0) FROM invoices),
                (SELECT COALESCE(SUM(amount_paid), 0) FROM transactions),
                (SELECT COUNT(*) FROM transactions)",
        [],
        |row| {
            Ok(FinancialReport {
                total_due: row.get(0)?,
                total_paid: row.get(1)?,
                transaction_count: row.get(2)?,
            })
        },
    )?;

    Ok(report)
}

// ============================================================================
// STATUS BREAKDOWN
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

/// Students grouped by enrollment status, most numerous first.
pub fn student_status_counts(conn: &Connection) -> Result<Vec<StatusCount>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) AS count FROM students
         GROUP BY status
         ORDER BY count DESC, status",
    )?;

    let counts = stmt
        .query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(counts)
}

// ============================================================================
// TESTS
// ============================================================================
