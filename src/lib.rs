// Loan Rewind - Core Library
// Exposes all modules for use in the operator CLI, the API server, and tests

pub mod config;
pub mod dates;
pub mod records;
pub mod ledger;         // Fineract client + batch undo/replay
pub mod session;        // On-disk session directories
pub mod spreadsheet;    // XLSX export/import
pub mod validation;
pub mod pipeline;       // undo → export → import → replay
pub mod auth;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ConfigError, LedgerConfig};
pub use dates::LedgerDateTime;
pub use records::{
    ReplayLog, ReplayOutcome, ReplayStatus, Summary, TransactionRecord,
    UndoLog, UndoOutcome, UndoStatus,
};
pub use ledger::{
    inspect_loan, FineractClient, LedgerApi, LedgerError, LedgerTransaction, LoanReport,
    RetryPolicy, REPAYMENT_TYPE_CODE, REPAYMENT_TYPE_VALUE,
};
pub use session::{Artifact, Session, SessionError, SessionStore, Stage};
pub use spreadsheet::{CodecError, SheetRow};
pub use validation::{validate_corrections, validate_sheet_rows, ValidationError, ValidationReport};
pub use pipeline::{
    ExportFile, ImportReport, Pipeline, PipelineError, ReplayReport,
    SessionStatus, UndoReport,
};
pub use auth::{AuthGate, CredentialGate};
pub use server::{build_router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global `tracing` subscriber. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default_filter = if debug {
        "loan_rewind=debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
