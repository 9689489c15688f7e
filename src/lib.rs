// Campus Ledger - Academic & Billing Core
// Exposes the ledger operations for use by the desktop UI layer and tests.
//
// The crate owns enrollment, grading, GPA derivation, invoice generation,
// payment settlement, and financial-aid accounting over a single SQLite
// store. Presentation, login, and import/export live outside this crate and
// call these operations directly.

pub mod aid;
pub mod billing;
pub mod catalog;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod gpa;
pub mod payment;
pub mod students;
pub mod summary;

// Re-export commonly used types and operations
pub use aid::{add_financial_aid, aid_for_student, AidType, FinancialAid, NewFinancialAid};
pub use billing::{
    generate_invoices_for_semester, invoice_by_id, invoices_for_student, items_for_invoice,
    pending_invoices_for_student, Invoice, InvoiceItem, InvoiceStatus,
};
pub use catalog::{
    add_subject, get_subject, get_subject_with_assignment, list_subjects, prerequisites_of,
    set_prerequisites, update_subject_and_assignment, Subject, SubjectWithAssignment,
    TeachingAssignment,
};
pub use db::{open, open_in_memory, setup_schema, with_tx};
pub use enrollment::{
    delete_assignment_score, enroll, enrollments_for_student, enrollments_for_subject,
    record_assignment_score, record_final_grade, scores_for_enrollment, update_assignment_score,
    AssignmentScore, EnrollmentRecord, RosterRecord, UNGRADED, WITHDRAWN,
};
pub use error::{LedgerError, Result};
pub use gpa::{calculate_and_update_gpa, compute_gpa, grade_point, most_failed_subjects, FailureCount};
pub use payment::{
    add_payment, transactions_for_invoice, transactions_for_student, NewPayment, Payment,
};
pub use students::{
    add_student, get_student, list_students, set_status, Student, StudentStatus,
};
pub use summary::{
    all_student_finance_summaries, financial_summary_report, student_status_counts,
    FinanceSummary, FinancialReport, StatusCount,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
