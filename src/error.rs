// Ledger error taxonomy
// Validation is rejected before any write; NotFound/Conflict report without
// writing; Storage carries anything that failed mid-transaction (the whole
// unit has already been rolled back by the time the caller sees it).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Student not found: {0}")]
    StudentNotFound(String),

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Enrollment not found: {0}")]
    EnrollmentNotFound(i64),

    #[error("Assignment score not found: {0}")]
    ScoreNotFound(i64),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(i64),

    #[error("Student already exists: {0}")]
    StudentExists(String),

    #[error("Subject already exists: {0}")]
    SubjectExists(String),

    #[error("Student {student_id} is already enrolled in {subject_id}")]
    AlreadyEnrolled {
        student_id: String,
        subject_id: String,
    },

    #[error("Invoices already generated for semester {0}")]
    SemesterAlreadyBilled(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// True for duplicate-record rejections (enrollment pairs, ids, billing runs).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LedgerError::StudentExists(_)
                | LedgerError::SubjectExists(_)
                | LedgerError::AlreadyEnrolled { .. }
                | LedgerError::SemesterAlreadyBilled(_)
        )
    }

    /// True when the operation referenced a record that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::StudentNotFound(_)
                | LedgerError::SubjectNotFound(_)
                | LedgerError::EnrollmentNotFound(_)
                | LedgerError::ScoreNotFound(_)
                | LedgerError::InvoiceNotFound(_)
        )
    }

    /// Busy/locked storage errors are the only class worth retrying.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            LedgerError::Storage(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let err = LedgerError::AlreadyEnrolled {
            student_id: "S1".to_string(),
            subject_id: "CS101".to_string(),
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_not_found_classification() {
        let err = LedgerError::InvoiceNotFound(42);
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_validation_is_never_transient() {
        let err = LedgerError::Validation("amount must be positive".to_string());
        assert!(!err.is_transient());
    }
}
