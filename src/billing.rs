// Billing engine - batch invoice generation for a semester, and the invoice
// read operations the payment side builds on. Generation bills the whole
// cohort of ENROLLED students in a single transaction: one invoice plus one
// base-fee line item each, all-or-nothing.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{self, with_tx};
use crate::error::{LedgerError, Result};

// ============================================================================
// INVOICE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
        }
    }

    pub fn parse(value: &str) -> Option<InvoiceStatus> {
        match value {
            "PENDING" => Some(InvoiceStatus::Pending),
            "PAID" => Some(InvoiceStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: i64,
    pub student_id: String,
    pub semester_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub total_amount: f64,
    /// Derived, monotonic: PENDING until settlement pays the total, PAID
    /// forever after.
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub item_id: i64,
    pub invoice_id: i64,
    pub description: String,
    pub amount: f64,
}

fn invoice_from_row(row: &Row) -> rusqlite::Result<Invoice> {
    let issue_date: String = row.get(3)?;
    let due_date: String = row.get(4)?;
    let status: String = row.get(6)?;

    Ok(Invoice {
        invoice_id: row.get(0)?,
        student_id: row.get(1)?,
        semester_id: row.get(2)?,
        issue_date: NaiveDate::parse_from_str(&issue_date, "%Y-%m-%d")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        total_amount: row.get(5)?,
        status: InvoiceStatus::parse(&status).ok_or(rusqlite::Error::InvalidQuery)?,
    })
}

const INVOICE_COLUMNS: &str =
    "invoice_id, student_id, semester_id, issue_date, due_date, total_amount, status";

// ============================================================================
// GENERATION
// ============================================================================

/// Generate one PENDING invoice (and its single base-fee line item) for every
/// student with status ENROLLED. The whole cohort is one atomic unit: if any
/// student's insert fails, the entire batch rolls back. Returns the number of
/// invoices created.
///
/// A semester can only be billed once; a second call reports
/// [`LedgerError::SemesterAlreadyBilled`] and writes nothing.
pub fn generate_invoices_for_semester(
    conn: &mut Connection,
    semester_id: &str,
    base_fee: f64,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> Result<usize> {
    if semester_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "semester id must not be blank".to_string(),
        ));
    }
    if !base_fee.is_finite() || base_fee <= 0.0 {
        return Err(LedgerError::Validation(
            "base fee must be positive".to_string(),
        ));
    }

    let count = with_tx(conn, |tx| {
        if db::exists(
            tx,
            "SELECT 1 FROM invoices WHERE semester_id = ?1",
            [semester_id],
        )? {
            return Err(LedgerError::SemesterAlreadyBilled(semester_id.to_string()));
        }

        let mut find_students =
            tx.prepare("SELECT student_id FROM students WHERE status = 'ENROLLED' ORDER BY student_id")?;
        let student_ids = find_students
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut insert_invoice = tx.prepare(
            "INSERT INTO invoices(student_id, semester_id, issue_date, due_date, total_amount, status)
             VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING')",
        )?;
        let mut insert_item = tx.prepare(
            "INSERT INTO invoice_items(invoice_id, description, amount) VALUES (?1, ?2, ?3)",
        )?;

        let description = format!("Base Tuition Fee - Semester {}", semester_id);
        let mut count = 0;

        for student_id in &student_ids {
            insert_invoice.execute(params![
                student_id,
                semester_id,
                issue_date.to_string(),
                due_date.to_string(),
                base_fee,
            ])?;
            let invoice_id = tx.last_insert_rowid();

            insert_item.execute(params![invoice_id, description, base_fee])?;
            count += 1;
        }

        Ok(count)
    })?;

    tracing::info!(semester_id, count, "invoices generated");
    Ok(count)
}

// ============================================================================
// READ OPERATIONS
// ============================================================================

pub fn invoice_by_id(conn: &Connection, invoice_id: i64) -> Result<Invoice> {
    conn.query_row(
        &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = ?1"),
        [invoice_id],
        invoice_from_row,
    )
    .optional()?
    .ok_or(LedgerError::InvoiceNotFound(invoice_id))
}

/// All invoices for a student, most recently issued first.
pub fn invoices_for_student(conn: &Connection, student_id: &str) -> Result<Vec<Invoice>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices
         WHERE student_id = ?1
         ORDER BY issue_date DESC, invoice_id DESC"
    ))?;

    let invoices = stmt
        .query_map([student_id], invoice_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(invoices)
}

/// Unsettled invoices for a student, due soonest first.
pub fn pending_invoices_for_student(conn: &Connection, student_id: &str) -> Result<Vec<Invoice>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices
         WHERE student_id = ?1 AND status = 'PENDING'
         ORDER BY due_date ASC, invoice_id ASC"
    ))?;

    let invoices = stmt
        .query_map([student_id], invoice_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(invoices)
}

pub fn items_for_invoice(conn: &Connection, invoice_id: i64) -> Result<Vec<InvoiceItem>> {
    let mut stmt = conn.prepare(
        "SELECT item_id, invoice_id, description, amount FROM invoice_items
         WHERE invoice_id = ?1
         ORDER BY item_id",
    )?;

    let items = stmt
        .query_map([invoice_id], |row| {
            Ok(InvoiceItem {
                item_id: row.get(0)?,
                invoice_id: row.get(1)?,
                description: row.get(2)?,
                amount: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(items)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::students::{add_student, StudentStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn generate(conn: &mut Connection, semester: &str) -> Result<usize> {
        generate_invoices_for_semester(conn, semester, 1000.0, date(2026, 1, 15), date(2026, 2, 15))
    }

    fn invoice_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_bills_only_enrolled_students() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();
        add_student(&conn, "S2", "Grace", StudentStatus::Enrolled).unwrap();
        add_student(&conn, "S3", "Edsger", StudentStatus::Dropped).unwrap();
        add_student(&conn, "S4", "Barbara", StudentStatus::OnLeave).unwrap();

        let count = generate(&mut conn, "T1").unwrap();
        assert_eq!(count, 2);
        assert_eq!(invoice_count(&conn), 2);
        assert!(invoices_for_student(&conn, "S3").unwrap().is_empty());
    }

    #[test]
    fn test_invoice_carries_one_base_fee_item() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();
        generate(&mut conn, "T1").unwrap();

        let invoices = invoices_for_student(&conn, "S1").unwrap();
        assert_eq!(invoices.len(), 1);
        let invoice = &invoices[0];
        assert_eq!(invoice.total_amount, 1000.0);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.semester_id, "T1");
        assert_eq!(invoice.issue_date, date(2026, 1, 15));

        let items = items_for_invoice(&conn, invoice.invoice_id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Base Tuition Fee - Semester T1");
        assert_eq!(items[0].amount, 1000.0);
    }

    #[test]
    fn test_empty_cohort_generates_nothing() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Graduated).unwrap();

        let count = generate(&mut conn, "T1").unwrap();
        assert_eq!(count, 0);
        assert_eq!(invoice_count(&conn), 0);
    }

    #[test]
    fn test_semester_can_only_be_billed_once() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();

        generate(&mut conn, "T1").unwrap();
        let err = generate(&mut conn, "T1").unwrap_err();
        assert!(matches!(err, LedgerError::SemesterAlreadyBilled(_)));
        assert_eq!(invoice_count(&conn), 1, "no second batch was written");

        // A different semester is still billable.
        assert_eq!(generate(&mut conn, "T2").unwrap(), 1);
    }

    #[test]
    fn test_base_fee_must_be_positive() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();

        for fee in [0.0, -100.0, f64::NAN, f64::INFINITY] {
            let err = generate_invoices_for_semester(
                &mut conn,
                "T1",
                fee,
                date(2026, 1, 15),
                date(2026, 2, 15),
            )
            .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }
        assert_eq!(invoice_count(&conn), 0);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();
        add_student(&conn, "S2", "Grace", StudentStatus::Enrolled).unwrap();

        // Force the line-item insert to fail mid-batch.
        conn.execute("DROP TABLE invoice_items", []).unwrap();

        let result = generate(&mut conn, "T1");
        assert!(result.is_err());
        assert_eq!(
            invoice_count(&conn),
            0,
            "no partial cohort billing survives a failure"
        );
    }

    #[test]
    fn test_pending_listing_orders_by_due_date() {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();

        generate_invoices_for_semester(&mut conn, "T2", 500.0, date(2026, 6, 1), date(2026, 7, 1))
            .unwrap();
        generate_invoices_for_semester(&mut conn, "T1", 500.0, date(2026, 1, 1), date(2026, 2, 1))
            .unwrap();

        let pending = pending_invoices_for_student(&conn, "S1").unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].semester_id, "T1");
        assert_eq!(pending[1].semester_id, "T2");
    }

    #[test]
    fn test_invoice_by_id_not_found() {
        let conn = open_in_memory().unwrap();
        let err = invoice_by_id(&conn, 99).unwrap_err();
        assert!(matches!(err, LedgerError::InvoiceNotFound(99)));
    }
}
