// 📐 Import Validation - a corrected sheet must describe the same rows
//
// The operator may change dates, amounts and payment details. They may not
// add or drop rows, move a row to another loan, or duplicate a transaction.

use crate::records::TransactionRecord;
use crate::spreadsheet::SheetRow;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// 1-based spreadsheet row, header is row 1; `None` for whole-sheet problems
    pub row: Option<usize>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn sheet(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            row: None,
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn at_row(row: usize, field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            row: Some(row),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "[row {}] {}: {}", row, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of checking a corrected sheet against what was undone
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }
}

/// Check `corrected` (in sheet order, no gaps) against the session's undone records.
pub fn validate_corrections(originals: &[TransactionRecord], corrected: &[TransactionRecord]) -> ValidationReport {
    let numbered: Vec<(usize, &TransactionRecord)> = corrected.iter().enumerate().map(|(i, r)| (i + 2, r)).collect();
    check_rows(originals, &numbered)
}

/// Same checks over decoded rows, reporting their real sheet row numbers.
pub fn validate_sheet_rows(originals: &[TransactionRecord], rows: &[SheetRow]) -> ValidationReport {
    let numbered: Vec<(usize, &TransactionRecord)> = rows.iter().map(|r| (r.line, &r.record)).collect();
    check_rows(originals, &numbered)
}

fn check_rows(originals: &[TransactionRecord], corrected: &[(usize, &TransactionRecord)]) -> ValidationReport {
    let mut errors = Vec::new();

    if corrected.len() != originals.len() {
        errors.push(ValidationError::sheet(
            "rows",
            format!(
                "expected {} transactions, sheet has {}; rows must not be added or removed",
                originals.len(),
                corrected.len()
            ),
        ));
    }

    let by_id: HashMap<i64, &TransactionRecord> = originals.iter().map(|r| (r.transaction_id, r)).collect();
    let mut seen = HashSet::new();
    let mut invalid_rows = HashSet::new();

    for (i, &(line, row)) in corrected.iter().enumerate() {
        match by_id.get(&row.transaction_id) {
            None => {
                errors.push(ValidationError::at_row(
                    line,
                    "Transaction ID",
                    format!("{} was not undone in this session", row.transaction_id),
                ));
                invalid_rows.insert(i);
            }
            Some(original) if original.loan_id != row.loan_id => {
                errors.push(ValidationError::at_row(
                    line,
                    "Loan ID",
                    format!("changed from {} to {}", original.loan_id, row.loan_id),
                ));
                invalid_rows.insert(i);
            }
            Some(_) => {}
        }
        if !seen.insert(row.transaction_id) {
            errors.push(ValidationError::at_row(
                line,
                "Transaction ID",
                format!("{} appears more than once", row.transaction_id),
            ));
            invalid_rows.insert(i);
        }
    }

    ValidationReport {
        valid_count: corrected.len() - invalid_rows.len(),
        invalid_count: invalid_rows.len(),
        errors,
    }
}
