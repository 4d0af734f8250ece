//! Intake API server lifecycle: bind, spawn, shut down.
//!
//! bind → spawn background task → return handle with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::intake_api_router;
use crate::core_state::CoreState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind intake server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("Failed to get server address: {0}")]
    Address(std::io::Error),
    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ═══════════════════════════════════════════════════════════
// Server handle
// ═══════════════════════════════════════════════════════════

/// Handle to a running intake server.
pub struct IntakeServer {
    pub addr: SocketAddr,
    pub started_at: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl IntakeServer {
    /// Signal a graceful shutdown. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Intake server shutdown signal sent");
        }
    }

    /// Wait for the server task to finish (after `shutdown`).
    pub async fn wait(self) -> Result<(), ServerError> {
        self.task.await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════

/// Bind `addr`, mount `intake_api_router` and serve it in a background task.
///
/// Port `0` binds an ephemeral port; the handle carries the real address.
pub async fn start_server(core: Arc<CoreState>, addr: SocketAddr) -> Result<IntakeServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let addr = listener.local_addr().map_err(ServerError::Address)?;

    tracing::info!(%addr, "Intake server binding");

    let app = intake_api_router(core);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Intake server received shutdown signal");
        };

        tracing::info!(%addr, "Intake server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!(error = %e, "Intake server error");
        }

        tracing::info!("Intake server stopped");
    });

    Ok(IntakeServer {
        addr,
        started_at: chrono::Utc::now().to_rfc3339(),
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}
