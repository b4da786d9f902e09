pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod router;
pub mod state;

use crate::{
    config::{get_config, AppConfig},
    router::create_router,
    state::{build_app_state, AppState},
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Installs the compact `tracing` subscriber shared by the server and the CLI.
pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

/// Reconciles both stores in the background so startup is not held up by it.
pub fn spawn_startup_sync(app_state: &AppState) {
    if !app_state.config.sync_on_startup {
        return;
    }
    if !app_state.core.durable.is_configured() {
        debug!("Startup reconciliation skipped: no durable store configured.");
        return;
    }
    let reconciler = app_state.core.reconciler.clone();
    tokio::spawn(async move {
        let report = reconciler.reconcile_all().await;
        if report.is_clean() {
            info!(duration_ms = report.duration_ms, "Startup reconciliation finished.");
        } else {
            warn!(errors = report.errors.len(), "Startup reconciliation finished with errors.");
        }
    });
}

/// Configures and runs the web server.
///
/// This function initializes the application state, creates the router,
/// and starts the Axum server.
pub async fn run(listener: TcpListener, config: AppConfig) -> anyhow::Result<()> {
    debug!(port = config.port, embedded = %config.embedded_db_path, "Server configuration loaded");

    let app_state = build_app_state(config).await?;
    spawn_startup_sync(&app_state);
    let app = create_router(app_state);

    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// The library's main entry point.
///
/// Sets up logging, configuration, and the TCP listener, then calls `run`.
pub async fn start() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = get_config(None)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    run(listener, config).await
}
