// 🏦 External Ledger - the only thing that talks to the loan system
//
// `LedgerApi` is the seam: the HTTP client implements it for production,
// tests plug in an in-memory ledger. Batch helpers in `batch` sequence the
// per-record calls and isolate failures to the record that caused them.

pub mod batch;
pub mod client;
pub mod inspect;
pub mod retry;

use crate::dates::LedgerDateTime;
use crate::records::TransactionRecord;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub use batch::{replay_all, reverse_since};
pub use client::FineractClient;
pub use inspect::{inspect_loan, LoanReport, TransactionLookup, UndoSelection};
pub use retry::{with_retry, RetryPolicy};

/// Type code the ledger uses for repayments
pub const REPAYMENT_TYPE_CODE: &str = "loanTransactionType.repayment";
/// Display value paired with `REPAYMENT_TYPE_CODE`
pub const REPAYMENT_TYPE_VALUE: &str = "Repayment";

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Connection refused/reset, timeout, DNS: worth retrying
    #[error("network error: {0}")]
    Network(String),

    /// The ledger answered with a non-success status
    #[error("HTTP {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected ledger response: {0}")]
    Decode(String),

    #[error("ledger client setup failed: {0}")]
    Setup(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }
}

/// A loan transaction as listed by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub id: i64,
    pub type_code: String,
    pub type_value: String,
    pub manually_reversed: bool,
    /// `None` when the ledger sent a date we could not read
    pub date: Option<LedgerDateTime>,
    pub amount: Decimal,
    pub payment_type_id: i64,
    pub channel_type_id: i64,
}

impl LedgerTransaction {
    /// Both the code and the display value must say repayment.
    pub fn is_repayment(&self) -> bool {
        self.type_code == REPAYMENT_TYPE_CODE && self.type_value == REPAYMENT_TYPE_VALUE
    }

    /// Live repayment dated on or after the cutoff's calendar day.
    ///
    /// The time of day is ignored so everything posted on the cutoff date
    /// itself is included.
    pub fn is_undo_candidate(&self, cutoff: &LedgerDateTime) -> bool {
        self.is_repayment()
            && !self.manually_reversed
            && self.date.map_or(false, |d| d.date() >= cutoff.date())
    }

    pub fn to_record(&self, loan_id: i64, date: LedgerDateTime) -> TransactionRecord {
        TransactionRecord {
            loan_id,
            transaction_id: self.id,
            transaction_date: date,
            transaction_amount: self.amount,
            payment_type_id: self.payment_type_id,
            channel_type_id: self.channel_type_id,
        }
    }
}

/// Operations the correction pipeline needs from the ledger
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// All transactions currently listed on the loan
    async fn loan_transactions(&self, loan_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError>;

    /// Reverse one posted transaction
    async fn undo_transaction(
        &self,
        loan_id: i64,
        transaction_id: i64,
        transaction_date: LedgerDateTime,
    ) -> Result<(), LedgerError>;

    /// Post a repayment; returns the ledger's id for the new transaction
    async fn create_repayment(&self, record: &TransactionRecord) -> Result<Option<i64>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn txn(id: i64, code: &str, date: Option<&str>, reversed: bool) -> LedgerTransaction {
        LedgerTransaction {
            id,
            type_code: code.to_string(),
            type_value: if code == REPAYMENT_TYPE_CODE { REPAYMENT_TYPE_VALUE } else { "Other" }.to_string(),
            manually_reversed: reversed,
            date: date.map(|d| LedgerDateTime::parse(d).unwrap()),
            amount: Decimal::from_str("10").unwrap(),
            payment_type_id: 8,
            channel_type_id: 1,
        }
    }

    #[test]
    fn test_cutoff_compares_calendar_days() {
        let cutoff = LedgerDateTime::parse("15 February 2024 23:59:59").unwrap();

        assert!(txn(1, REPAYMENT_TYPE_CODE, Some("15 February 2024 00:00:00"), false)
            .is_undo_candidate(&cutoff));
        assert!(txn(2, REPAYMENT_TYPE_CODE, Some("16 February 2024"), false).is_undo_candidate(&cutoff));
        assert!(!txn(3, REPAYMENT_TYPE_CODE, Some("14 February 2024 23:59:59"), false)
            .is_undo_candidate(&cutoff));
    }

    #[test]
    fn test_non_repayments_and_reversed_are_skipped() {
        let cutoff = LedgerDateTime::parse("01 January 2024").unwrap();

        assert!(!txn(1, "loanTransactionType.disbursement", Some("02 January 2024"), false)
            .is_undo_candidate(&cutoff));
        assert!(!txn(2, REPAYMENT_TYPE_CODE, Some("02 January 2024"), true).is_undo_candidate(&cutoff));
        assert!(!txn(3, REPAYMENT_TYPE_CODE, None, false).is_undo_candidate(&cutoff));
    }

    #[test]
    fn test_repayment_needs_matching_value() {
        let cutoff = LedgerDateTime::parse("01 January 2024").unwrap();
        let mut charged = txn(1, REPAYMENT_TYPE_CODE, Some("02 January 2024"), false);
        charged.type_value = "Charge Payment".to_string();

        assert!(!charged.is_repayment());
        assert!(!charged.is_undo_candidate(&cutoff));
    }

    #[test]
    fn test_only_network_errors_retry() {
        assert!(LedgerError::Network("reset".into()).is_retryable());
        assert!(!LedgerError::Rejected {
            status: 403,
            message: "nope".into()
        }
        .is_retryable());
        assert!(!LedgerError::Decode("bad json".into()).is_retryable());
    }
}
