use std::sync::Arc;

use outreach_assist::approvals::ApprovalGate;
use outreach_assist::clients::dry_run::{DryRunOutreach, NeutralScorer, TemplateGenerator};
use outreach_assist::clients::{LogNotifier, Notifier, WebhookNotifier};
use outreach_assist::config::{EngineConfig, Settings};
use outreach_assist::scheduler::SchedulerEngine;
use outreach_assist::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let settings = Settings::from_env()?;
    let engine_config = EngineConfig::from_env()?;

    let db_path =
        std::env::var("OUTREACH_DB_PATH").unwrap_or_else(|_| "./data/outreach.db".to_string());

    eprintln!("Outreach Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", db_path);
    eprintln!(
        "   Working hours: {:02}:00-{:02}:00 (UTC{:+}min), weekends paused: {}",
        settings.work_start_hour,
        settings.work_end_hour,
        settings.utc_offset_minutes,
        settings.pause_on_weekends
    );

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );

    let notifier: Arc<dyn Notifier> = match std::env::var("OUTREACH_WEBHOOK_URL") {
        Ok(url) => {
            eprintln!("   Approval notifications: webhook {}", url);
            let token = std::env::var("OUTREACH_WEBHOOK_TOKEN")
                .ok()
                .map(secrecy::SecretString::from);
            Arc::new(WebhookNotifier::new(url, token))
        }
        Err(_) => {
            eprintln!("   Approval notifications: log only");
            Arc::new(LogNotifier)
        }
    };

    let gate = Arc::new(ApprovalGate::new(db.clone(), notifier));

    // Production network/scorer/generator adapters run out of process;
    // without them the engine runs in dry-run mode.
    eprintln!("   Collaborators: dry-run (no external sends)");
    let engine = SchedulerEngine::new(
        db,
        gate,
        Arc::new(DryRunOutreach),
        Arc::new(NeutralScorer),
        Arc::new(TemplateGenerator),
        settings,
        engine_config,
    );

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let engine_handle = tokio::spawn(async move { engine.run(stop_rx).await });

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down (letting the current cycle finish)...");
    let _ = stop_tx.send(true);
    engine_handle.await?;

    Ok(())
}
