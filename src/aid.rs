// Financial aid applicator - records a grant/discount/waiver and applies it
// to an invoice through the same settlement routine as a cash payment. The
// aid row and its balance effect commit together: a failed settlement rolls
// the aid record back with it.

use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::db::with_tx;
use crate::error::{LedgerError, Result};
use crate::payment::{apply_payment, NewPayment};

// ============================================================================
// AID TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AidType {
    Scholarship,
    Discount,
    Waiver,
}

impl AidType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AidType::Scholarship => "SCHOLARSHIP",
            AidType::Discount => "DISCOUNT",
            AidType::Waiver => "WAIVER",
        }
    }

    pub fn parse(value: &str) -> Option<AidType> {
        match value {
            "SCHOLARSHIP" => Some(AidType::Scholarship),
            "DISCOUNT" => Some(AidType::Discount),
            "WAIVER" => Some(AidType::Waiver),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialAid {
    pub aid_id: i64,
    pub student_id: String,
    pub semester_id: String,
    /// The invoice this aid is deducted from.
    pub invoice_id: i64,
    pub aid_type: AidType,
    pub description: String,
    pub amount: f64,
    pub apply_date: String,
}

/// Input for a new aid record. The apply date is stamped at insert time.
#[derive(Debug, Clone)]
pub struct NewFinancialAid {
    pub student_id: String,
    pub semester_id: String,
    pub invoice_id: i64,
    pub aid_type: AidType,
    pub description: String,
    pub amount: f64,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Record a financial aid entry and settle it against its invoice as one
/// atomic unit. The aid is mirrored into a synthetic payment (method = aid
/// type, reference = description) and routed through the payment processor's
/// settlement routine, so a scholarship moves the invoice balance and status
/// exactly like cash. Returns the new aid id.
pub fn add_financial_aid(conn: &mut Connection, aid: &NewFinancialAid) -> Result<i64> {
    if !aid.amount.is_finite() || aid.amount <= 0.0 {
        return Err(LedgerError::Validation(
            "aid amount must be positive".to_string(),
        ));
    }

    let aid_id = with_tx(conn, |tx| {
        let apply_date = Utc::now().date_naive().to_string();
        tx.execute(
            "INSERT INTO financial_aid(student_id, semester_id, invoice_id, aid_type, description, amount, apply_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                aid.student_id,
                aid.semester_id,
                aid.invoice_id,
                aid.aid_type.as_str(),
                aid.description,
                aid.amount,
                apply_date,
            ],
        )?;
        let aid_id = tx.last_insert_rowid();

        let settlement = NewPayment {
            invoice_id: aid.invoice_id,
            student_id: aid.student_id.clone(),
            amount_paid: aid.amount,
            method: aid.aid_type.as_str().to_string(),
            reference_code: Some(aid.description.clone()),
        };
        apply_payment(tx, &settlement)?;

        Ok(aid_id)
    })?;

    tracing::info!(
        student_id = %aid.student_id,
        invoice_id = aid.invoice_id,
        aid_type = aid.aid_type.as_str(),
        amount = aid.amount,
        "financial aid applied"
    );
    Ok(aid_id)
}

/// All aid recorded for a student, newest first.
pub fn aid_for_student(conn: &Connection, student_id: &str) -> Result<Vec<FinancialAid>> {
    let mut stmt = conn.prepare(
        "SELECT aid_id, student_id, semester_id, invoice_id, aid_type, description, amount, apply_date
         FROM financial_aid
         WHERE student_id = ?1
         ORDER BY apply_date DESC, aid_id DESC",
    )?;

    let aid = stmt
        .query_map([student_id], |row| {
            let aid_type: String = row.get(4)?;
            Ok(FinancialAid {
                aid_id: row.get(0)?,
                student_id: row.get(1)?,
                semester_id: row.get(2)?,
                invoice_id: row.get(3)?,
                aid_type: AidType::parse(&aid_type).ok_or(rusqlite::Error::InvalidQuery)?,
                description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                amount: row.get(6)?,
                apply_date: row.get(7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(aid)
}

// ============================================================================
// TESTS
// ============================================================================
