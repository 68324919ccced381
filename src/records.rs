// 🧾 Records - what moves between ledger, session folder and spreadsheet

use crate::dates::LedgerDateTime;
use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One loan transaction as the operator sees it.
///
/// Fetched records are never mutated; a corrected row from the spreadsheet
/// is a separate value used for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub loan_id: i64,
    pub transaction_id: i64,
    pub transaction_date: LedgerDateTime,
    pub transaction_amount: Decimal,
    pub payment_type_id: i64,
    pub channel_type_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoStatus {
    Undone,
    Failed,
}

/// Result of reversing one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoOutcome {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub status: UndoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UndoOutcome {
    pub fn undone(record: TransactionRecord) -> Self {
        UndoOutcome {
            record,
            status: UndoStatus::Undone,
            error: None,
        }
    }

    pub fn failed(record: TransactionRecord, error: impl Into<String>) -> Self {
        UndoOutcome {
            record,
            status: UndoStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_undone(&self) -> bool {
        self.status == UndoStatus::Undone
    }
}

/// `transactions.json`: everything the undo step touched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoLog {
    pub timestamp: DateTime<Local>,
    pub loan_id: i64,
    pub cutoff_date: LedgerDateTime,
    pub transactions: Vec<UndoOutcome>,
}

impl UndoLog {
    pub fn summary(&self) -> Summary {
        Summary::tally(self.transactions.iter().map(UndoOutcome::is_undone))
    }

    /// Records that were actually reversed, in undo order.
    ///
    /// Only these go to the spreadsheet; failed reversals are still live in
    /// the ledger and replaying them would double-post.
    pub fn undone_records(&self) -> Vec<TransactionRecord> {
        self.transactions
            .iter()
            .filter(|o| o.is_undone())
            .map(|o| o.record.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    Success,
    Failed,
}

/// Result of re-posting one corrected record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    #[serde(flatten)]
    pub record: TransactionRecord,
    pub replay_status: ReplayStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_transaction_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_error: Option<String>,
}

impl ReplayOutcome {
    pub fn success(record: TransactionRecord, new_transaction_id: Option<i64>) -> Self {
        ReplayOutcome {
            record,
            replay_status: ReplayStatus::Success,
            new_transaction_id,
            replay_error: None,
        }
    }

    pub fn failed(record: TransactionRecord, error: impl Into<String>) -> Self {
        ReplayOutcome {
            record,
            replay_status: ReplayStatus::Failed,
            new_transaction_id: None,
            replay_error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.replay_status == ReplayStatus::Success
    }
}

/// `replay_results.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    pub timestamp: DateTime<Local>,
    pub replay_results: Vec<ReplayOutcome>,
    pub summary: Summary,
}

impl ReplayLog {
    pub fn new(replay_results: Vec<ReplayOutcome>) -> Self {
        let summary = Summary::tally(replay_results.iter().map(ReplayOutcome::is_success));
        ReplayLog {
            timestamp: Local::now(),
            replay_results,
            summary,
        }
    }
}

/// Success/failure counts for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl Summary {
    pub fn tally(outcomes: impl IntoIterator<Item = bool>) -> Self {
        outcomes.into_iter().fold(Summary::default(), |mut s, ok| {
            s.total += 1;
            if ok {
                s.successful += 1;
            } else {
                s.failed += 1;
            }
            s
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn test_undo_outcome_json_shape() {
        let outcome = UndoOutcome::undone(record(501, "20 February 2024 00:00:00", "150.75"));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["loan_id"], 19130);
        assert_eq!(json["transaction_id"], 501);
        assert_eq!(json["transaction_date"], "20 February 2024 00:00:00");
        assert_eq!(json["transaction_amount"], "150.75");
        assert_eq!(json["status"], "undone");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_undone_records_skip_failures() {
        let log = UndoLog {
            timestamp: Local::now(),
            loan_id: 19130,
            cutoff_date: LedgerDateTime::parse("15 February 2024").unwrap(),
            transactions: vec![
                UndoOutcome::undone(record(3, "22 February 2024", "10")),
                UndoOutcome::failed(record(2, "21 February 2024", "20"), "HTTP 403"),
                UndoOutcome::undone(record(1, "20 February 2024", "30")),
            ],
        };

        let ids: Vec<i64> = log.undone_records().iter().map(|r| r.transaction_id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(
            log.summary(),
            Summary {
                total: 3,
                successful: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn test_undo_log_round_trips_through_json() {
        let log = UndoLog {
            timestamp: Local::now(),
            loan_id: 19130,
            cutoff_date: LedgerDateTime::parse("15 February 2024 23:59:59").unwrap(),
            transactions: vec![UndoOutcome::failed(
                record(7, "16 February 2024", "99.99"),
                "boom",
            )],
        };
        let json = serde_json::to_string_pretty(&log).unwrap();
        let back: UndoLog = serde_json::from_str(&json).unwrap();

        assert_eq!(back.transactions, log.transactions);
        assert_eq!(back.cutoff_date, log.cutoff_date);
    }

    #[test]
    fn test_replay_log_summary() {
        let log = ReplayLog::new(vec![
            ReplayOutcome::success(record(1, "20 February 2024", "30"), Some(900)),
            ReplayOutcome::failed(record(2, "21 February 2024", "20"), "rejected"),
        ]);

        assert_eq!(log.summary.total, 2);
        assert_eq!(log.summary.successful, 1);
        assert_eq!(log.summary.failed, 1);
    }
}
