// Loan Rewind - Web Server
// REST API + browser UI over the correction pipeline

use anyhow::{Context, Result};
use loan_rewind::{build_router, AppState, Config, CredentialGate, FineractClient, Pipeline, SessionStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("❌ {:#}", e);
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    loan_rewind::init_tracing(config.debug);

    info!("🌐 Loan Rewind {} - Web Server", loan_rewind::VERSION);
    info!("Ledger: {} (tenant {})", config.ledger.base_url, config.ledger.tenant_id);

    std::fs::create_dir_all(&config.sessions_dir)
        .with_context(|| format!("Failed to create {}", config.sessions_dir.display()))?;
    info!("✓ Sessions directory: {}", config.sessions_dir.display());

    let auth = Arc::new(CredentialGate::from_token(&config.ledger.auth_token));
    let ledger = FineractClient::new(config.ledger.clone()).context("Failed to build ledger client")?;
    let pipeline = Pipeline::new(Arc::new(ledger), SessionStore::new(&config.sessions_dir));

    let app = build_router(AppState::new(pipeline, auth));

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("🚀 Server running on http://{}", addr);
    info!("   API: http://{}/api/health", addr);
    info!("   UI:  http://{}", addr);

    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}
