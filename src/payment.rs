// Payment processor - records payments against an invoice and derives the
// invoice's PENDING/PAID status from the running total. The settlement
// routine takes a plain connection so financial aid can nest it inside its
// own transaction; `add_payment` is the standalone form that wraps it in one.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::with_tx;
use crate::error::{LedgerError, Result};
use crate::students::student_exists;

// ============================================================================
// PAYMENT TYPES
// ============================================================================

/// A recorded payment. Append-only: payments are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub transaction_id: i64,
    pub invoice_id: i64,
    pub student_id: String,
    pub payment_date: String,
    pub amount_paid: f64,
    /// Free text: ONLINE, COUNTER, TRANSFER - or an aid type for the
    /// synthetic payments financial aid records.
    pub method: String,
    pub reference_code: Option<String>,
}

/// Input for a new payment. The payment date is stamped at insert time.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: i64,
    pub student_id: String,
    pub amount_paid: f64,
    pub method: String,
    pub reference_code: Option<String>,
}

// ============================================================================
// SETTLEMENT
// ============================================================================

/// Record a payment and resettle its invoice as one atomic unit: the
/// transaction row, the paid-total recomputation, and any PENDING -> PAID
/// flip all commit together or not at all. Returns the new transaction id.
pub fn add_payment(conn: &mut Connection, payment: &NewPayment) -> Result<i64> {
    with_tx(conn, |tx| apply_payment(tx, payment))
}

/// The settlement routine shared by cash payments and financial aid:
/// insert the transaction, sum everything paid against the invoice, and
/// mark the invoice PAID once the sum covers the total. PAID is monotonic -
/// nothing here (or anywhere else) writes PENDING over it, and overpayment
/// simply leaves the balance negative.
///
/// Callers are responsible for the transactional boundary; both call sites
/// run this inside an open transaction.
pub(crate) fn apply_payment(conn: &Connection, payment: &NewPayment) -> Result<i64> {
    if !payment.amount_paid.is_finite() || payment.amount_paid <= 0.0 {
        return Err(LedgerError::Validation(
            "payment amount must be positive".to_string(),
        ));
    }
    if !student_exists(conn, &payment.student_id)? {
        return Err(LedgerError::StudentNotFound(payment.student_id.clone()));
    }

    let total_due: f64 = conn
        .query_row(
            "SELECT total_amount FROM invoices WHERE invoice_id = ?1",
            [payment.invoice_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(LedgerError::InvoiceNotFound(payment.invoice_id))?;

    let payment_date = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO transactions(invoice_id, student_id, payment_date, amount_paid, payment_method, reference_code)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            payment.invoice_id,
            payment.student_id,
            payment_date,
            payment.amount_paid,
            payment.method,
            payment.reference_code,
        ],
    )?;
    let transaction_id = conn.last_insert_rowid();

    let total_paid: f64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_paid), 0) FROM transactions WHERE invoice_id = ?1",
        [payment.invoice_id],
        |row| row.get(0),
    )?;

    if total_paid >= total_due {
        conn.execute(
            "UPDATE invoices SET status = 'PAID' WHERE invoice_id = ?1",
            [payment.invoice_id],
        )?;
        tracing::info!(
            invoice_id = payment.invoice_id,
            total_paid,
            total_due,
            "invoice settled"
        );
    }

    Ok(transaction_id)
}

// ============================================================================
// READ OPERATIONS
// ============================================================================

pub fn transactions_for_student(conn: &Connection, student_id: &str) -> Result<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT transaction_id, invoice_id, student_id, payment_date, amount_paid, payment_method, reference_code
         FROM transactions
         WHERE student_id = ?1
         ORDER BY payment_date DESC, transaction_id DESC",
    )?;

    let payments = stmt
        .query_map([student_id], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(payments)
}

pub fn transactions_for_invoice(conn: &Connection, invoice_id: i64) -> Result<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT transaction_id, invoice_id, student_id, payment_date, amount_paid, payment_method, reference_code
         FROM transactions
         WHERE invoice_id = ?1
         ORDER BY payment_date DESC, transaction_id DESC",
    )?;

    let payments = stmt
        .query_map([invoice_id], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(payments)
}

fn payment_from_row(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        transaction_id: row.get(0)?,
        invoice_id: row.get(1)?,
        student_id: row.get(2)?,
        payment_date: row.get(3)?,
        amount_paid: row.get(4)?,
        method: row.get(5)?,
        reference_code: row.get(6)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{generate_invoices_for_semester, invoice_by_id, InvoiceStatus};
    use crate::db::open_in_memory;
    use crate::students::{add_student, StudentStatus};
    use chrono::NaiveDate;

    fn setup_with_invoice() -> (Connection, i64) {
        let mut conn = open_in_memory().unwrap();
        add_student(&conn, "S1", "Ada", StudentStatus::Enrolled).unwrap();
        generate_invoices_for_semester(
            &mut conn,
            "T1",
            1000.0,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
        )
        .unwrap();

        let invoice_id = conn
            .query_row("SELECT invoice_id FROM invoices", [], |row| row.get(0))
            .unwrap();
        (conn, invoice_id)
    }

    fn payment(invoice_id: i64, amount: f64) -> NewPayment {
        NewPayment {
            invoice_id,
            student_id: "S1".to_string(),
            amount_paid: amount,
            method: "TRANSFER".to_string(),
            reference_code: Some("REF-001".to_string()),
        }
    }

    #[test]
    fn test_partial_payment_keeps_invoice_pending() {
        let (mut conn, invoice_id) = setup_with_invoice();

        add_payment(&mut conn, &payment(invoice_id, 600.0)).unwrap();

        let invoice = invoice_by_id(&conn, invoice_id).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        let recorded = transactions_for_invoice(&conn, invoice_id).unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount_paid, 600.0);
        assert_eq!(recorded[0].method, "TRANSFER");
        assert_eq!(recorded[0].reference_code.as_deref(), Some("REF-001"));
    }

    #[test]
    fn test_covering_payment_flips_to_paid() {
        let (mut conn, invoice_id) = setup_with_invoice();

        add_payment(&mut conn, &payment(invoice_id, 600.0)).unwrap();
        add_payment(&mut conn, &payment(invoice_id, 400.0)).unwrap();

        let invoice = invoice_by_id(&conn, invoice_id).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_paid_status_is_monotonic() {
        let (mut conn, invoice_id) = setup_with_invoice();

        add_payment(&mut conn, &payment(invoice_id, 1000.0)).unwrap();
        assert_eq!(
            invoice_by_id(&conn, invoice_id).unwrap().status,
            InvoiceStatus::Paid
        );

        // Overpayment: balance goes negative, status never reverts.
        add_payment(&mut conn, &payment(invoice_id, 250.0)).unwrap();
        let invoice = invoice_by_id(&conn, invoice_id).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let total_paid: f64 = conn
            .query_row(
                "SELECT SUM(amount_paid) FROM transactions WHERE invoice_id = ?1",
                [invoice_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total_paid, 1250.0);
    }

    #[test]
    fn test_amount_must_be_positive() {
        let (mut conn, invoice_id) = setup_with_invoice();

        for amount in [0.0, -50.0, f64::NAN] {
            let err = add_payment(&mut conn, &payment(invoice_id, amount)).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)));
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_payment_against_missing_invoice() {
        let (mut conn, _) = setup_with_invoice();

        let err = add_payment(&mut conn, &payment(999, 100.0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvoiceNotFound(999)));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "no orphan payment row");
    }

    #[test]
    fn test_payment_from_unknown_student() {
        let (mut conn, invoice_id) = setup_with_invoice();

        let mut p = payment(invoice_id, 100.0);
        p.student_id = "ghost".to_string();
        let err = add_payment(&mut conn, &p).unwrap_err();
        assert!(matches!(err, LedgerError::StudentNotFound(_)));
    }

    #[test]
    fn test_exact_payment_settles_at_zero_balance() {
        let (mut conn, invoice_id) = setup_with_invoice();

        add_payment(&mut conn, &payment(invoice_id, 1000.0)).unwrap();
        assert_eq!(
            invoice_by_id(&conn, invoice_id).unwrap().status,
            InvoiceStatus::Paid
        );
    }
}
