// End-to-end: undo → export → edit → import → replay over an in-memory ledger

mod common;

use common::{MemoryLedger, CUTOFF, LOAN_ID};
use loan_rewind::spreadsheet::{decode, encode, HEADERS};
use loan_rewind::{
    Artifact, LedgerDateTime, Pipeline, PipelineError, ReplayLog, SessionStore, Stage, UndoLog,
};
use loan_rewind::TransactionRecord;
use rust_xlsxwriter::Workbook;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<MemoryLedger>, Pipeline) {
    let tmp = TempDir::new().unwrap();
    let ledger = Arc::new(MemoryLedger::seeded());
    let pipeline = Pipeline::new(ledger.clone(), SessionStore::new(tmp.path().join("sessions")));
    (tmp, ledger, pipeline)
}

#[tokio::test]
async fn test_undo_creates_one_session_with_three_records() {
    let (_tmp, ledger, pipeline) = setup();

    let report = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();

    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 0);
    assert_eq!(*ledger.undo_calls.lock().unwrap(), vec![104, 103, 102]);

    let sessions = pipeline.store().list().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id(), report.session_id);
    assert_eq!(sessions[0].stage(), Stage::Undone);

    let log: UndoLog = sessions[0].read_json(Artifact::UndoLog).unwrap();
    assert_eq!(log.loan_id, LOAN_ID);
    assert_eq!(log.undone_records().len(), 3);
}

#[tokio::test]
async fn test_export_decodes_to_undone_records() {
    let (_tmp, _ledger, pipeline) = setup();
    let undo = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();

    let export = pipeline.export(Some(&undo.session_id)).unwrap();

    assert_eq!(export.file_name, format!("transactions_{}.xlsx", undo.session_id));
    let expected: Vec<_> = undo.transactions.iter().map(|o| o.record.clone()).collect();
    assert_eq!(decode(&export.bytes).unwrap(), expected);

    let session = pipeline.store().open(&undo.session_id).unwrap();
    assert_eq!(session.read_bytes(Artifact::ExportSheet).unwrap(), export.bytes);
}

#[tokio::test]
async fn test_import_with_missing_row_is_rejected() {
    let (_tmp, _ledger, pipeline) = setup();
    let undo = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();
    let export = pipeline.export(None).unwrap();

    let mut rows = decode(&export.bytes).unwrap();
    rows.pop();
    let short_sheet = encode(&rows).unwrap();

    let err = pipeline.import(Some(&undo.session_id), &short_sheet).unwrap_err();
    match err {
        PipelineError::Validation(report) => {
            assert!(!report.is_valid());
            assert_eq!(report.valid_count, 2);
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    let session = pipeline.store().open(&undo.session_id).unwrap();
    assert!(!session.has(Artifact::CorrectedSheet));
    assert_eq!(session.stage(), Stage::Exported);
}

/// Operator-style sheet: each record lands on the given 0-based sheet row,
/// leaving whatever rows are skipped empty.
fn sheet_with_gaps(rows: &[(u32, &TransactionRecord)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, title) in HEADERS.iter().enumerate() {
        sheet.write_string(0, c as u16, *title).unwrap();
    }
    for (row, record) in rows {
        sheet.write_number(*row, 0, record.loan_id as f64).unwrap();
        sheet.write_number(*row, 1, record.transaction_id as f64).unwrap();
        sheet.write_string(*row, 2, record.transaction_date.to_string()).unwrap();
        sheet.write_string(*row, 3, record.transaction_amount.to_string()).unwrap();
        sheet.write_number(*row, 4, record.payment_type_id as f64).unwrap();
        sheet.write_number(*row, 5, record.channel_type_id as f64).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn test_import_reports_real_row_after_blank_row() {
    let (_tmp, _ledger, pipeline) = setup();
    let undo = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();
    let export = pipeline.export(None).unwrap();

    let mut rows = decode(&export.bytes).unwrap();
    rows[2].loan_id = 20000;
    // Sheet row 3 left empty, so the records sit on rows 2, 4 and 5.
    let sheet = sheet_with_gaps(&[(1, &rows[0]), (3, &rows[1]), (4, &rows[2])]);

    let err = pipeline.import(Some(&undo.session_id), &sheet).unwrap_err();
    match err {
        PipelineError::Validation(report) => {
            assert_eq!(report.errors.len(), 1);
            assert_eq!(report.errors[0].row, Some(5));
            assert_eq!(report.errors[0].to_string(), "[row 5] Loan ID: changed from 19130 to 20000");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    rows[2].loan_id = LOAN_ID;
    let sheet = sheet_with_gaps(&[(1, &rows[0]), (3, &rows[1]), (4, &rows[2])]);
    let report = pipeline.import(Some(&undo.session_id), &sheet).unwrap();
    assert_eq!(report.total_count, 3);
}

#[tokio::test]
async fn test_replay_carries_only_the_edited_date() {
    let (_tmp, ledger, pipeline) = setup();
    let undo = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();
    let id = Some(undo.session_id.as_str());
    let export = pipeline.export(id).unwrap();

    let originals = decode(&export.bytes).unwrap();
    let mut edited = originals.clone();
    let new_date = LedgerDateTime::parse("25 February 2024 10:30:00").unwrap();
    let edited_id = edited[1].transaction_id;
    edited[1].transaction_date = new_date;

    let import = pipeline.import(id, &encode(&edited).unwrap()).unwrap();
    assert_eq!(import.valid_count, 3);
    assert_eq!(import.invalid_count, 0);

    let replay = pipeline.replay(id).await.unwrap();
    assert_eq!(replay.success_count, 3);
    assert_eq!(replay.failure_count, 0);

    let repaid = ledger.repaid();
    assert_eq!(repaid.len(), 3);
    for posted in &repaid {
        let original = originals
            .iter()
            .find(|r| r.transaction_id == posted.transaction_id)
            .unwrap();
        if posted.transaction_id == edited_id {
            assert_eq!(posted.transaction_date, new_date);
        } else {
            assert_eq!(posted.transaction_date, original.transaction_date);
        }
        assert_eq!(posted.transaction_amount, original.transaction_amount);
    }
    // earliest first
    assert!(repaid.windows(2).all(|w| w[0].transaction_date <= w[1].transaction_date));
    assert_eq!(repaid.last().unwrap().transaction_id, edited_id);

    let session = pipeline.store().open(&undo.session_id).unwrap();
    let log: ReplayLog = session.read_json(Artifact::ReplayLog).unwrap();
    assert_eq!(log.summary.total, 3);
    assert_eq!(session.stage(), Stage::Replayed);
}

#[tokio::test]
async fn test_second_replay_is_refused() {
    let (_tmp, ledger, pipeline) = setup();
    pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();
    let export = pipeline.export(None).unwrap();
    pipeline.import(None, &export.bytes).unwrap();
    pipeline.replay(None).await.unwrap();

    let err = pipeline.replay(None).await.unwrap_err();

    assert!(matches!(err, PipelineError::StageViolation { actual: Stage::Replayed, .. }));
    assert_eq!(ledger.repaid().len(), 3);
}

#[tokio::test]
async fn test_export_and_import_can_be_repeated() {
    let (_tmp, _ledger, pipeline) = setup();
    pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();

    let first = pipeline.export(None).unwrap();
    let second = pipeline.export(None).unwrap();
    assert_eq!(decode(&first.bytes).unwrap(), decode(&second.bytes).unwrap());

    pipeline.import(None, &first.bytes).unwrap();
    pipeline.import(None, &second.bytes).unwrap();
    assert_eq!(pipeline.status(None).unwrap().stage, Stage::Imported);
}

#[tokio::test]
async fn test_latest_session_wins_when_none_named() {
    let (_tmp, _ledger, pipeline) = setup();
    let first = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();
    // Everything after the cutoff is already reversed, so nothing is left to undo.
    let second = pipeline.undo(LOAN_ID, CUTOFF).await.unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(second.success_count, 0);
    assert_eq!(pipeline.status(None).unwrap().session_id, second.session_id);
    assert!(matches!(pipeline.export(None), Err(PipelineError::Empty(_))));
    assert!(pipeline.export(Some(&first.session_id)).is_ok());
}

#[tokio::test]
async fn test_unknown_loan_surfaces_ledger_error() {
    let (_tmp, ledger, pipeline) = setup();

    let err = pipeline.undo(42, CUTOFF).await.unwrap_err();

    assert!(matches!(err, PipelineError::Ledger(_)));
    assert!(ledger.undo_calls.lock().unwrap().is_empty());
    assert!(pipeline.sessions().unwrap().is_empty());
}
