//! Remote Ancient Store server
//!
//! Opens the freezer kept in an object backend and serves it over JSON-RPC
//! until SIGINT or SIGTERM.
//!
//! ## Example Usage
//! ```bash
//! # Local filesystem backend, HTTP on localhost:9797
//! ancient-store --namespace mainnet --local-root ./data/ancient
//!
//! # S3 bucket, Unix socket
//! AWS_REGION=us-west-2 ancient-store --namespace mainnet-ancients \
//!     --backend s3 --ipc /var/run/ancient.ipc
//! ```
//!
//! ## Logging
//! `RUST_LOG` takes precedence over `--log-level`.

use std::sync::Arc;

use ancient_core::AncientStore;
use ancient_server::{Args, FreezerApi, HttpServer, IpcServer, Listen};
use ancient_storage::{Freezer, ObjectStoreBackend};
use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    ancient_observability::init();

    let freezer_config = args.freezer_config()?;
    let backend_config = args.backend_config();
    tracing::info!(
        namespace = %backend_config.namespace,
        backend = ?args.backend,
        "Starting ancient store"
    );

    let backend = ObjectStoreBackend::connect(&backend_config)
        .await
        .context("failed to connect object backend")?;
    let freezer = Arc::new(
        Freezer::open(Arc::new(backend), freezer_config)
            .await
            .context("failed to open freezer")?,
    );
    let api = Arc::new(FreezerApi::new(freezer.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            },
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            },
        }
        let _ = shutdown_tx.send(());
    });
    let shutdown = async {
        shutdown_rx.await.ok();
    };

    match args.listen() {
        Listen::Ipc(path) => {
            let server = IpcServer::bind(&path, api)
                .with_context(|| format!("failed to bind IPC socket {}", path.display()))?;
            server.run_until(shutdown).await?;
        }
        Listen::Http(addr) => {
            let server = HttpServer::bind(addr.as_str(), api)
                .await
                .with_context(|| format!("failed to bind HTTP listener {}", addr))?;
            server.run_until(shutdown).await?;
        }
    }

    tracing::info!("Flushing freezer before exit");
    if let Err(e) = freezer.sync().await {
        tracing::error!(error = %e, "Final sync failed");
    }
    freezer.close().await?;

    tracing::info!("Ancient store stopped");
    Ok(())
}
