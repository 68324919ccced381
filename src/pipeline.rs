// 🔄 Pipeline Orchestrator - undo → export → import → replay
//
// Every operation names its session explicitly. `None` means "latest on
// disk", which is what a single operator with one browser tab wants and
// survives a server restart.

use crate::dates::LedgerDateTime;
use crate::ledger::{replay_all, reverse_since, LedgerApi, LedgerError};
use crate::records::{ReplayLog, ReplayOutcome, Summary, TransactionRecord, UndoLog, UndoOutcome};
use crate::session::{Artifact, Session, SessionError, SessionStore, Stage};
use crate::spreadsheet::{self, CodecError};
use crate::validation::{validate_sheet_rows, ValidationReport};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    BadInput(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Failed to fetch loan: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Import rejected: {}", .0.first_error().map(|e| e.to_string()).unwrap_or_default())]
    Validation(ValidationReport),

    #[error("Session {session} is {} but {operation} needs it {expected}", .actual.name())]
    StageViolation {
        session: String,
        operation: &'static str,
        actual: Stage,
        expected: &'static str,
    },

    #[error("{0}")]
    Empty(String),
}

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct UndoReport {
    pub session_id: String,
    pub loan_id: i64,
    pub success_count: usize,
    pub failure_count: usize,
    pub transactions: Vec<UndoOutcome>,
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub session_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub session_id: String,
    pub total_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub session_id: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    pub results: Vec<ReplayOutcome>,
}

/// What the status endpoint and the CLI show for a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub loan_id: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub stage: Stage,
    pub undo: Option<Summary>,
    pub replay: Option<Summary>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    ledger: Arc<dyn LedgerApi>,
    store: SessionStore,
}

impl Pipeline {
    pub fn new(ledger: Arc<dyn LedgerApi>, store: SessionStore) -> Self {
        Pipeline { ledger, store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Reverse everything on the loan from `cutoff_date` on, in a new session.
    pub async fn undo(&self, loan_id: i64, cutoff_date: &str) -> Result<UndoReport, PipelineError> {
        if loan_id <= 0 {
            return Err(PipelineError::BadInput(format!("Invalid loan id {loan_id}")));
        }
        let cutoff = LedgerDateTime::parse(cutoff_date)
            .map_err(|e| PipelineError::BadInput(format!("Failed to parse cutoff date '{cutoff_date}': {e}")))?;

        let session = self.store.create_session(loan_id)?;
        info!("🗄️  Undo loan {} from {} in {}", loan_id, cutoff, session.id());

        let outcomes = match reverse_since(self.ledger.as_ref(), loan_id, cutoff).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                // Nothing was reversed, so the directory holds nothing worth keeping.
                if let Err(rm) = std::fs::remove_dir(session.dir()) {
                    warn!("Could not remove empty session {}: {}", session.id(), rm);
                }
                return Err(e.into());
            }
        };

        let log = UndoLog {
            timestamp: Local::now(),
            loan_id,
            cutoff_date: cutoff,
            transactions: outcomes,
        };
        session.write_json(Artifact::UndoLog, &log)?;

        let summary = log.summary();
        info!(
            "=== UNDO COMPLETE === success: {} | failed: {} | session: {}",
            summary.successful,
            summary.failed,
            session.id()
        );

        Ok(UndoReport {
            session_id: session.id().to_string(),
            loan_id,
            success_count: summary.successful,
            failure_count: summary.failed,
            transactions: log.transactions,
        })
    }

    /// Spreadsheet of the reversed transactions. Re-running overwrites it.
    pub fn export(&self, session_id: Option<&str>) -> Result<ExportFile, PipelineError> {
        let session = self.store.resolve(session_id)?;
        require(&session, "export", Stage::Undone, Stage::Replayed, "undone")?;

        let records = self.undone_records(&session)?;
        if records.is_empty() {
            return Err(PipelineError::Empty(format!(
                "No undone transactions to export in session {}",
                session.id()
            )));
        }

        let bytes = spreadsheet::encode(&records)?;
        let path = session.write_bytes(Artifact::ExportSheet, &bytes)?;
        info!("✅ Excel exported to session: {}", path.display());

        Ok(ExportFile {
            session_id: session.id().to_string(),
            file_name: format!("transactions_{}.xlsx", session.id()),
            bytes,
            record_count: records.len(),
        })
    }

    /// Accept the operator's corrected sheet. Nothing is stored unless every
    /// row checks out against what was undone.
    pub fn import(&self, session_id: Option<&str>, bytes: &[u8]) -> Result<ImportReport, PipelineError> {
        let session = self.store.resolve(session_id)?;
        require(&session, "import", Stage::Exported, Stage::Imported, "exported")?;

        let corrected = match spreadsheet::decode_rows(bytes) {
            Ok(corrected) => corrected,
            Err(CodecError::Invalid {
                errors,
                valid_rows,
                invalid_rows,
            }) => {
                return Err(PipelineError::Validation(ValidationReport {
                    valid_count: valid_rows,
                    invalid_count: invalid_rows,
                    errors,
                }))
            }
            Err(e) => return Err(e.into()),
        };

        let originals = self.undone_records(&session)?;
        let report = validate_sheet_rows(&originals, &corrected);
        if !report.is_valid() {
            warn!(
                "Import into {} rejected: {} problem(s)",
                session.id(),
                report.errors.len()
            );
            return Err(PipelineError::Validation(report));
        }

        let path = session.write_bytes(Artifact::CorrectedSheet, bytes)?;
        info!("✅ Corrected Excel saved to session: {}", path.display());

        Ok(ImportReport {
            session_id: session.id().to_string(),
            total_count: corrected.len(),
            valid_count: report.valid_count,
            invalid_count: report.invalid_count,
        })
    }

    /// Post the corrected rows as new repayments. Runs once per session.
    pub async fn replay(&self, session_id: Option<&str>) -> Result<ReplayReport, PipelineError> {
        let session = self.store.resolve(session_id)?;
        require(&session, "replay", Stage::Imported, Stage::Imported, "imported and not yet replayed")?;

        let corrected = spreadsheet::decode(&session.read_bytes(Artifact::CorrectedSheet)?)?;
        if corrected.is_empty() {
            return Err(PipelineError::Empty("No transactions found to replay".to_string()));
        }
        info!("Replaying {} transactions from {}", corrected.len(), session.id());

        let outcomes = replay_all(self.ledger.as_ref(), &corrected).await;
        let log = ReplayLog::new(outcomes);
        let path = session.write_json(Artifact::ReplayLog, &log)?;
        info!(
            "=== REPLAY COMPLETE === success: {} | failed: {} | saved to {}",
            log.summary.successful,
            log.summary.failed,
            path.display()
        );

        Ok(ReplayReport {
            session_id: session.id().to_string(),
            success_count: log.summary.successful,
            failure_count: log.summary.failed,
            total_count: log.summary.total,
            results: log.replay_results,
        })
    }

    pub fn status(&self, session_id: Option<&str>) -> Result<SessionStatus, PipelineError> {
        let session = self.store.resolve(session_id)?;
        Ok(describe(&session))
    }

    pub fn sessions(&self) -> Result<Vec<SessionStatus>, PipelineError> {
        Ok(self.store.list()?.iter().map(describe).collect())
    }

    fn undone_records(&self, session: &Session) -> Result<Vec<TransactionRecord>, PipelineError> {
        let log: UndoLog = session.read_json(Artifact::UndoLog)?;
        Ok(log.undone_records())
    }
}

/// Session must be in `min..=max` for `operation` to run.
fn require(
    session: &Session,
    operation: &'static str,
    min: Stage,
    max: Stage,
    expected: &'static str,
) -> Result<(), PipelineError> {
    let actual = session.stage();
    if actual < min || actual > max {
        return Err(PipelineError::StageViolation {
            session: session.id().to_string(),
            operation,
            actual,
            expected,
        });
    }
    Ok(())
}

/// Summary of a session from whatever artifacts it holds. Unreadable
/// artifacts show up as missing counts rather than failing the listing.
pub fn describe(session: &Session) -> SessionStatus {
    let undo = session
        .read_json::<UndoLog>(Artifact::UndoLog)
        .ok()
        .map(|log| log.summary());
    let replay = session
        .read_json::<ReplayLog>(Artifact::ReplayLog)
        .ok()
        .map(|log| log.summary);

    SessionStatus {
        session_id: session.id().to_string(),
        loan_id: session.loan_id(),
        created_at: session.created_at(),
        stage: session.stage(),
        undo,
        replay,
    }
}
