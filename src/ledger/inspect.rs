// 🔎 Loan inspection - read-only view of what the ledger holds for a loan
//
// Used by the operator CLI to check a loan before and after a correction:
// which repayments are live, which of them an undo would pick up, and
// whether a given transaction has been reversed.

use super::{LedgerApi, LedgerError, LedgerTransaction};
use crate::dates::LedgerDateTime;
use std::cmp::Reverse;
use std::fmt;

/// Live repayments on one loan, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct LoanReport {
    pub loan_id: i64,
    pub live_repayments: Vec<LedgerTransaction>,
    /// Set when a cutoff was given: ids an undo from that cutoff would reverse
    pub undo_selection: Option<UndoSelection>,
    pub lookup: Option<TransactionLookup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndoSelection {
    pub cutoff: LedgerDateTime,
    pub transaction_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionLookup {
    Found(LedgerTransaction),
    /// Not on the loan; every id the ledger did list, ascending
    Missing { transaction_id: i64, known_ids: Vec<i64> },
}

impl LoanReport {
    /// Build the report from a transaction listing.
    pub fn from_listing(
        loan_id: i64,
        listed: Vec<LedgerTransaction>,
        cutoff: Option<LedgerDateTime>,
        transaction_id: Option<i64>,
    ) -> Self {
        let lookup = transaction_id.map(|id| match listed.iter().find(|t| t.id == id) {
            Some(found) => TransactionLookup::Found(found.clone()),
            None => {
                let mut known_ids: Vec<i64> = listed.iter().map(|t| t.id).collect();
                known_ids.sort_unstable();
                TransactionLookup::Missing {
                    transaction_id: id,
                    known_ids,
                }
            }
        });

        let undo_selection = cutoff.map(|cutoff| {
            let mut transaction_ids: Vec<i64> = listed
                .iter()
                .filter(|t| t.is_undo_candidate(&cutoff))
                .map(|t| t.id)
                .collect();
            transaction_ids.sort_unstable();
            UndoSelection {
                cutoff,
                transaction_ids,
            }
        });

        let mut live_repayments: Vec<LedgerTransaction> = listed
            .into_iter()
            .filter(|t| t.is_repayment() && !t.manually_reversed)
            .collect();
        // Undated entries sort last.
        live_repayments.sort_by_key(|t| Reverse((t.date.map(|d| d.naive()), t.id)));

        LoanReport {
            loan_id,
            live_repayments,
            undo_selection,
            lookup,
        }
    }

    pub fn latest(&self) -> Option<&LedgerTransaction> {
        self.live_repayments.first()
    }

    fn selected(&self, id: i64) -> bool {
        self.undo_selection
            .as_ref()
            .map_or(false, |s| s.transaction_ids.contains(&id))
    }
}

/// Fetch the loan's transactions and build its report.
pub async fn inspect_loan(
    ledger: &dyn LedgerApi,
    loan_id: i64,
    cutoff: Option<LedgerDateTime>,
    transaction_id: Option<i64>,
) -> Result<LoanReport, LedgerError> {
    let listed = ledger.loan_transactions(loan_id).await?;
    Ok(LoanReport::from_listing(loan_id, listed, cutoff, transaction_id))
}

fn date_text(txn: &LedgerTransaction) -> String {
    txn.date.map_or_else(|| "(no date)".to_string(), |d| d.to_string())
}

impl fmt::Display for LoanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🏦 Loan {}", self.loan_id)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "{} live repayment(s), newest first", self.live_repayments.len())?;
        for txn in &self.live_repayments {
            let marker = if self.selected(txn.id) { "  ↩️  would undo" } else { "" };
            writeln!(f, "  {:>10}  {:<28} {:>12}{}", txn.id, date_text(txn), txn.amount, marker)?;
        }
        if let Some(latest) = self.latest() {
            writeln!(f, "Latest live repayment: {}", latest.id)?;
        }

        if let Some(selection) = &self.undo_selection {
            writeln!(
                f,
                "\n↩️  Undo from {} would reverse {} transaction(s): {:?}",
                selection.cutoff.date(),
                selection.transaction_ids.len(),
                selection.transaction_ids
            )?;
        }

        match &self.lookup {
            Some(TransactionLookup::Found(txn)) => {
                writeln!(f, "\n🔎 Transaction {}", txn.id)?;
                writeln!(f, "  Type:     {} ({})", txn.type_value, txn.type_code)?;
                writeln!(f, "  Date:     {}", date_text(txn))?;
                writeln!(f, "  Amount:   {}", txn.amount)?;
                writeln!(
                    f,
                    "  Status:   {}",
                    if txn.manually_reversed { "REVERSED" } else { "ACTIVE" }
                )?;
            }
            Some(TransactionLookup::Missing {
                transaction_id,
                known_ids,
            }) => {
                writeln!(f, "\n🔎 Transaction {} is not on this loan", transaction_id)?;
                writeln!(f, "  Listed ids: {:?}", known_ids)?;
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{REPAYMENT_TYPE_CODE, REPAYMENT_TYPE_VALUE};
    use rust_decimal::Decimal;

    fn txn(id: i64, code: &str, date: Option<&str>, reversed: bool) -> LedgerTransaction {
        LedgerTransaction {
            id,
            type_code: code.to_string(),
            type_value: if code == REPAYMENT_TYPE_CODE { REPAYMENT_TYPE_VALUE } else { "Disbursement" }.to_string(),
            manually_reversed: reversed,
            date: date.map(|d| LedgerDateTime::parse(d).unwrap()),
            amount: Decimal::new(10050, 2),
            payment_type_id: 8,
            channel_type_id: 1,
        }
    }

    fn listing() -> Vec<LedgerTransaction> {
        vec![
            txn(100, "loanTransactionType.disbursement", Some("01 January 2024"), false),
            txn(101, REPAYMENT_TYPE_CODE, Some("10 February 2024"), false),
            txn(102, REPAYMENT_TYPE_CODE, Some("20 February 2024"), true),
            txn(103, REPAYMENT_TYPE_CODE, Some("15 February 2024 09:30:00"), false),
            txn(104, REPAYMENT_TYPE_CODE, Some("01 March 2024"), false),
            txn(105, REPAYMENT_TYPE_CODE, None, false),
        ]
    }

    fn ids(report: &LoanReport) -> Vec<i64> {
        report.live_repayments.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_live_repayments_newest_first() {
        let report = LoanReport::from_listing(19130, listing(), None, None);

        assert_eq!(ids(&report), vec![104, 103, 101, 105]);
        assert_eq!(report.latest().map(|t| t.id), Some(104));
        assert!(report.undo_selection.is_none());
    }

    #[test]
    fn test_cutoff_selects_same_day_and_later() {
        let cutoff = LedgerDateTime::parse("15 February 2024 23:59:59").unwrap();
        let report = LoanReport::from_listing(19130, listing(), Some(cutoff), None);

        let selection = report.undo_selection.as_ref().unwrap();
        assert_eq!(selection.transaction_ids, vec![103, 104]);

        let text = report.to_string();
        assert!(text.contains("Undo from 2024-02-15 would reverse 2 transaction(s): [103, 104]"));
        assert_eq!(text.matches("would undo").count(), 2);
    }

    #[test]
    fn test_reversed_transaction_is_reported() {
        let report = LoanReport::from_listing(19130, listing(), None, Some(102));

        match &report.lookup {
            Some(TransactionLookup::Found(t)) => assert!(t.manually_reversed),
            other => panic!("expected a found transaction, got {other:?}"),
        }
        let text = report.to_string();
        assert!(text.contains("🔎 Transaction 102"));
        assert!(text.contains("Status:   REVERSED"));
    }

    #[test]
    fn test_missing_transaction_lists_known_ids() {
        let report = LoanReport::from_listing(19130, listing(), None, Some(999));

        assert_eq!(
            report.lookup,
            Some(TransactionLookup::Missing {
                transaction_id: 999,
                known_ids: vec![100, 101, 102, 103, 104, 105],
            })
        );
        assert!(report.to_string().contains("Transaction 999 is not on this loan"));
    }

    #[test]
    fn test_empty_loan_renders() {
        let report = LoanReport::from_listing(19130, Vec::new(), None, None);

        assert!(report.latest().is_none());
        assert!(report.to_string().contains("0 live repayment(s)"));
    }
}
