pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod intake;
pub mod models;
pub mod report;
pub mod session_store;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the intake service and serve until Ctrl-C.
pub async fn run() -> Result<(), api::ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let core = Arc::new(core_state::CoreState::new());
    tracing::info!(db = %core.db_path.display(), "Consultation store");

    let mut server = api::start_server(core, config::bind_addr()).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
    }
    server.shutdown();
    server.wait().await
}
