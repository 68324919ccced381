// 📦 Batch operations - sequential, one record at a time
//
// The ledger recalculates dates after every reversal, so undo works from
// stable transaction ids and re-reads the loan before each call. Calls are
// never issued concurrently: the ledger's ordering semantics are unknown.

use super::{LedgerApi, LedgerError, LedgerTransaction};
use crate::dates::LedgerDateTime;
use crate::records::{ReplayOutcome, TransactionRecord, UndoOutcome};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Reverse every live repayment on `loan_id` dated on/after `cutoff`.
///
/// Only the first listing failing aborts the whole operation. After that,
/// each reversal failure is recorded against its transaction and the batch
/// continues.
pub async fn reverse_since(
    ledger: &dyn LedgerApi,
    loan_id: i64,
    cutoff: LedgerDateTime,
) -> Result<Vec<UndoOutcome>, LedgerError> {
    let listed = ledger.loan_transactions(loan_id).await?;
    debug!("Loan {} has {} transactions, cutoff {}", loan_id, listed.len(), cutoff);

    let mut last_seen: HashMap<i64, LedgerTransaction> = listed
        .into_iter()
        .filter(|t| t.is_undo_candidate(&cutoff))
        .map(|t| (t.id, t))
        .collect();
    let mut remaining: BTreeSet<i64> = last_seen.keys().copied().collect();
    info!("Identified {} transactions to undo: {:?}", remaining.len(), remaining);

    let total = remaining.len();
    let mut outcomes = Vec::with_capacity(total);

    while !remaining.is_empty() {
        debug!("Undo {}/{}", total - remaining.len() + 1, total);

        let current = match ledger.loan_transactions(loan_id).await {
            Ok(current) => current,
            Err(e) => {
                warn!("❌ Re-reading loan {} failed: {}", loan_id, e);
                abandon(&mut outcomes, &remaining, &last_seen, loan_id, &format!("loan re-read failed: {e}"));
                break;
            }
        };

        let Some((date, txn)) = latest_remaining(&current, &remaining) else {
            warn!("❌ None of {:?} are listed on loan {} any more", remaining, loan_id);
            abandon(&mut outcomes, &remaining, &last_seen, loan_id, "transaction no longer listed by the ledger");
            break;
        };

        let record = txn.to_record(loan_id, date);
        match ledger.undo_transaction(loan_id, txn.id, date).await {
            Ok(()) => outcomes.push(UndoOutcome::undone(record)),
            Err(e) => {
                warn!("❌ Failed to undo transaction {}: {}", txn.id, e);
                outcomes.push(UndoOutcome::failed(record, e.to_string()));
            }
        }

        remaining.remove(&txn.id);
        last_seen.insert(txn.id, txn.clone());
    }

    Ok(outcomes)
}

/// Remaining target with the latest current date; ties go to the higher id.
fn latest_remaining<'a>(
    current: &'a [LedgerTransaction],
    remaining: &BTreeSet<i64>,
) -> Option<(LedgerDateTime, &'a LedgerTransaction)> {
    current
        .iter()
        .filter(|t| remaining.contains(&t.id))
        .filter_map(|t| t.date.map(|d| (d, t)))
        .max_by_key(|(d, t)| (*d, t.id))
}

fn abandon(
    outcomes: &mut Vec<UndoOutcome>,
    remaining: &BTreeSet<i64>,
    last_seen: &HashMap<i64, LedgerTransaction>,
    loan_id: i64,
    reason: &str,
) {
    for id in remaining.iter().rev() {
        if let Some(txn) = last_seen.get(id) {
            if let Some(date) = txn.date {
                outcomes.push(UndoOutcome::failed(txn.to_record(loan_id, date), reason));
            }
        }
    }
}

/// Post each record as a repayment, earliest date first.
///
/// The sort is stable so rows sharing a date keep their sheet order.
pub async fn replay_all(ledger: &dyn LedgerApi, records: &[TransactionRecord]) -> Vec<ReplayOutcome> {
    let mut ordered: Vec<&TransactionRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.transaction_date);

    let mut outcomes = Vec::with_capacity(ordered.len());
    for (i, record) in ordered.into_iter().enumerate() {
        debug!(
            "Replaying {}/{}: transaction {}, {} on {}",
            i + 1,
            records.len(),
            record.transaction_id,
            record.transaction_amount,
            record.transaction_date
        );
        match ledger.create_repayment(record).await {
            Ok(new_id) => outcomes.push(ReplayOutcome::success(record.clone(), new_id)),
            Err(e) => {
                warn!("❌ Replay failed for transaction {}: {}", record.transaction_id, e);
                outcomes.push(ReplayOutcome::failed(record.clone(), e.to_string()));
            }
        }
    }
    outcomes
}
