use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radiarch_worker::config::WorkerConfig;
use radiarch_worker::context::AppContext;
use radiarch_worker::pool::{QueuedJobPoller, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "radiarch_worker=debug,radiarch_pipeline=debug,radiarch_db=info,radiarch_pacs=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        worker_count = config.worker_count,
        artifact_dir = %config.artifact_dir.display(),
        force_synthetic = config.force_synthetic,
        "Loaded worker configuration",
    );

    // --- Services ---
    let ctx = AppContext::from_config(config)
        .await
        .context("Failed to initialise worker services")?;

    // --- Worker pool + poller ---
    let pool = Arc::new(WorkerPool::spawn(
        Arc::new(ctx.runner()),
        ctx.config.worker_count,
        ctx.config.hard_time_limit,
    ));
    let poller = QueuedJobPoller::new(
        Arc::clone(&ctx.store),
        Arc::clone(&pool),
        ctx.config.poll_interval,
    );
    let cancel = CancellationToken::new();
    let poller_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { poller.run(cancel).await })
    };

    tracing::info!("Radiarch worker started");
    shutdown_signal().await;

    cancel.cancel();
    if let Err(e) = poller_handle.await {
        tracing::error!(error = %e, "Poller task failed");
    }
    pool.shutdown().await;
    tracing::info!("Radiarch worker stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
