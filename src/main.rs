// Loan Rewind - operator CLI
// Inspect session directories on disk, or a loan on the ledger, without
// starting the server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loan_rewind::pipeline::describe;
use loan_rewind::{
    inspect_loan, Artifact, Config, FineractClient, LedgerDateTime, ReplayLog, SessionStore, UndoLog,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loan-rewind", version, about = "Inspect loan correction sessions")]
struct Cli {
    /// Directory holding the session folders
    #[arg(long, env = "SESSIONS_DIR", default_value = "./sessions")]
    sessions_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every session, newest first
    Sessions,
    /// Show the undo and replay outcomes of one session (latest if omitted)
    Show { session_id: Option<String> },
    /// List a loan's live repayments on the ledger (read-only)
    Loan {
        loan_id: i64,
        /// Also show one transaction and whether it is reversed
        #[arg(long)]
        transaction: Option<i64>,
        /// Mark the repayments an undo from this date would reverse
        #[arg(long)]
        cutoff: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    loan_rewind::init_tracing(false);

    let store = SessionStore::new(&cli.sessions_dir);
    match cli.command {
        Command::Sessions => list_sessions(&store),
        Command::Show { session_id } => show_session(&store, session_id.as_deref()),
        Command::Loan {
            loan_id,
            transaction,
            cutoff,
        } => show_loan(loan_id, transaction, cutoff.as_deref()).await,
    }
}

async fn show_loan(loan_id: i64, transaction: Option<i64>, cutoff: Option<&str>) -> Result<()> {
    let cutoff = cutoff
        .map(LedgerDateTime::parse)
        .transpose()
        .context("Invalid --cutoff date")?;

    let config = Config::from_env().context("Invalid configuration")?;
    let ledger = FineractClient::new(config.ledger).context("Failed to build ledger client")?;
    let report = inspect_loan(&ledger, loan_id, cutoff, transaction)
        .await
        .with_context(|| format!("Failed to read loan {loan_id}"))?;

    print!("{report}");
    Ok(())
}

fn list_sessions(store: &SessionStore) -> Result<()> {
    let sessions = store
        .list()
        .with_context(|| format!("Failed to read {}", store.root().display()))?;

    if sessions.is_empty() {
        println!("No sessions in {}", store.root().display());
        return Ok(());
    }

    println!("🗂️  {} session(s) in {}", sessions.len(), store.root().display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for session in &sessions {
        let status = describe(session);
        let undo = status
            .undo
            .map(|s| format!("{} undone / {} failed", s.successful, s.failed))
            .unwrap_or_else(|| "-".to_string());
        let replay = status
            .replay
            .map(|s| format!("{} replayed / {} failed", s.successful, s.failed))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<42} {:<9} {:<24} {}",
            status.session_id,
            status.stage.name(),
            undo,
            replay
        );
    }
    Ok(())
}

fn show_session(store: &SessionStore, session_id: Option<&str>) -> Result<()> {
    let session = store.resolve(session_id).context("Failed to open session")?;
    let status = describe(&session);

    println!("🗂️  {}", session.id());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(loan_id) = status.loan_id {
        println!("Loan:    {}", loan_id);
    }
    if let Some(created) = status.created_at {
        println!("Created: {}", created);
    }
    println!("Stage:   {}", status.stage.name());

    if session.has(Artifact::UndoLog) {
        let log: UndoLog = session.read_json(Artifact::UndoLog)?;
        println!("\n↩️  Undo (cutoff {})", log.cutoff_date);
        for outcome in &log.transactions {
            let r = &outcome.record;
            println!(
                "  {:>10}  {}  {:>12}  {}{}",
                r.transaction_id,
                r.transaction_date,
                r.transaction_amount,
                if outcome.is_undone() { "✓ undone" } else { "✗ failed" },
                outcome.error.as_deref().map(|e| format!(" ({e})")).unwrap_or_default()
            );
        }
    }

    if session.has(Artifact::ReplayLog) {
        let log: ReplayLog = session.read_json(Artifact::ReplayLog)?;
        println!("\n🔁 Replay ({} ok / {} failed)", log.summary.successful, log.summary.failed);
        for outcome in &log.replay_results {
            let r = &outcome.record;
            let result = match (&outcome.new_transaction_id, &outcome.replay_error) {
                (_, Some(err)) => format!("✗ {err}"),
                (Some(id), None) => format!("✓ new id {id}"),
                (None, None) => "✓".to_string(),
            };
            println!(
                "  {:>10}  {}  {:>12}  {}",
                r.transaction_id, r.transaction_date, r.transaction_amount, result
            );
        }
    }

    Ok(())
}
