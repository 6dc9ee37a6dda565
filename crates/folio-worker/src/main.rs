//! folio-worker - pipeline worker binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use folio_core::{EventBus, IngestRequest, Orchestrator, PipelineEvent, WorkerPool};
use folio_worker::{create_orchestrator, load_config};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Mirror pipeline events into the log.
fn log_events(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut subscriber = events.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscriber.recv().await {
            match &event {
                PipelineEvent::Progress(p) => {
                    info!(document_id = %p.document_id, stage = %p.stage, percent = p.percent, step = %p.step, "Progress")
                }
                PipelineEvent::StatusChanged(s) => {
                    info!(document_id = %s.document_id, from = %s.from, to = %s.to, "Status changed")
                }
                PipelineEvent::Error(e) if e.will_retry => {
                    warn!(document_id = %e.document_id, stage = %e.stage, error = %e.message, "Stage attempt failed, retrying")
                }
                PipelineEvent::Error(e) => {
                    error!(document_id = %e.document_id, stage = %e.stage, error = %e.message, "Stage failed")
                }
                PipelineEvent::Completed(c) => {
                    info!(document_id = %c.document_id, stage = %c.stage, items = c.items, item_errors = c.item_errors, "Stage completed")
                }
            }
        }
    })
}

async fn ingest_file(orchestrator: &Orchestrator, owner_id: &str, path: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let outcome = orchestrator
        .ingest(IngestRequest::new(owner_id, file_name, content))
        .await?;
    let document = outcome.document();
    if outcome.is_duplicate() {
        info!(document_id = %document.id, status = %document.status, path = %path.display(), "Already uploaded");
    } else {
        info!(document_id = %document.id, path = %path.display(), "Queued for processing");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,folio_core=debug"))?)
        .init();

    let config = load_config().context("invalid configuration")?;
    info!(
        database = %config.database_path.display(),
        storage = %config.storage_root.display(),
        llm = %config.llm.provider,
        embedder = %config.embedder.provider,
        "Starting folio-worker"
    );

    let orchestrator = Arc::new(create_orchestrator(config)?);
    let logger = log_events(orchestrator.events());
    let workers = WorkerPool::start(orchestrator.clone()).await?;
    info!(workers = workers.worker_count(), "Worker pools running");

    let owner_id = std::env::var("FOLIO_OWNER_ID").unwrap_or_else(|_| "local".to_string());
    for arg in std::env::args().skip(1) {
        if let Err(e) = ingest_file(&orchestrator, &owner_id, Path::new(&arg)).await {
            error!(path = %arg, error = %e, "Ingest failed");
        }
    }

    shutdown_signal().await;
    info!("Shutdown signal received, draining workers...");
    workers.shutdown().await;
    logger.abort();

    info!("Worker stopped cleanly");
    Ok(())
}
