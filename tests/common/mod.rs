// In-memory ledger shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use loan_rewind::{
    LedgerApi, LedgerDateTime, LedgerError, LedgerTransaction, TransactionRecord, REPAYMENT_TYPE_CODE,
    REPAYMENT_TYPE_VALUE,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Mutex;

pub const LOAN_ID: i64 = 19130;
pub const CUTOFF: &str = "15 February 2024 23:59:59";

/// A single loan whose reversals and repayments are remembered
#[derive(Default)]
pub struct MemoryLedger {
    pub transactions: Mutex<Vec<LedgerTransaction>>,
    pub undo_calls: Mutex<Vec<i64>>,
    pub repayments: Mutex<Vec<TransactionRecord>>,
    pub offline: bool,
}

impl MemoryLedger {
    pub fn with(transactions: Vec<LedgerTransaction>) -> Self {
        MemoryLedger {
            transactions: Mutex::new(transactions),
            ..Default::default()
        }
    }

    /// Three repayments after the cutoff, plus noise the undo must leave alone
    pub fn seeded() -> Self {
        Self::with(vec![
            txn(100, "loanTransactionType.disbursement", "01 January 2024", "5000"),
            txn(101, REPAYMENT_TYPE_CODE, "10 February 2024", "250"),
            txn(102, REPAYMENT_TYPE_CODE, "16 February 2024", "250.50"),
            txn(103, REPAYMENT_TYPE_CODE, "18 February 2024", "125.25"),
            txn(104, REPAYMENT_TYPE_CODE, "20 February 2024", "99.99"),
            txn(105, "loanTransactionType.accrual", "20 February 2024", "12"),
        ])
    }

    pub fn repaid(&self) -> Vec<TransactionRecord> {
        self.repayments.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), LedgerError> {
        if self.offline {
            return Err(LedgerError::Network("connection refused".into()));
        }
        Ok(())
    }
}

pub fn txn(id: i64, code: &str, date: &str, amount: &str) -> LedgerTransaction {
    LedgerTransaction {
        id,
        type_code: code.to_string(),
        type_value: if code == REPAYMENT_TYPE_CODE { REPAYMENT_TYPE_VALUE } else { "Other" }.to_string(),
        manually_reversed: false,
        date: Some(LedgerDateTime::parse(date).unwrap()),
        amount: Decimal::from_str(amount).unwrap(),
        payment_type_id: 8,
        channel_type_id: 1,
    }
}

#[async_trait]
impl LedgerApi for MemoryLedger {
    async fn loan_transactions(&self, loan_id: i64) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.check_online()?;
        if loan_id != LOAN_ID {
            return Err(LedgerError::Rejected {
                status: 404,
                message: format!("Loan with identifier {loan_id} does not exist"),
            });
        }
        Ok(self.transactions.lock().unwrap().clone())
    }

    async fn undo_transaction(&self, _loan_id: i64, transaction_id: i64, _date: LedgerDateTime) -> Result<(), LedgerError> {
        self.check_online()?;
        let mut transactions = self.transactions.lock().unwrap();
        let txn = transactions
            .iter_mut()
            .find(|t| t.id == transaction_id)
            .ok_or_else(|| LedgerError::Rejected {
                status: 404,
                message: format!("Transaction {transaction_id} not found"),
            })?;
        txn.manually_reversed = true;
        self.undo_calls.lock().unwrap().push(transaction_id);
        Ok(())
    }

    async fn create_repayment(&self, record: &TransactionRecord) -> Result<Option<i64>, LedgerError> {
        self.check_online()?;
        let mut repayments = self.repayments.lock().unwrap();
        repayments.push(record.clone());
        Ok(Some(9000 + repayments.len() as i64))
    }
}
