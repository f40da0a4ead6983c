use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaflow_api::background;
use mediaflow_api::config::ServerConfig;
use mediaflow_api::router::build_app_router;
use mediaflow_api::state::AppState;
use mediaflow_api::ws;
use mediaflow_pipeline::YtDlpDownloader;
use mediaflow_store::FileStatusStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mediaflow_api=debug,mediaflow_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid configuration");
    tracing::info!(
        host = %config.host,
        port = %config.port,
        download_dir = %config.download_dir.display(),
        "Loaded server configuration",
    );

    // --- Storage ---
    let store = FileStatusStore::open(config.status_store_path.clone())
        .await
        .expect("Failed to open status store");
    tracing::info!(path = %store.path().display(), "Status store opened");

    // --- Pipeline ---
    let downloader = Arc::new(YtDlpDownloader::new(config.ytdlp.clone()));
    let state = AppState::assemble(config.clone(), Arc::new(store), downloader);
    state
        .library()
        .ensure_root()
        .await
        .expect("Failed to create download directory");

    match state.orchestrator.recover_interrupted().await {
        Ok(0) => {}
        Ok(recovered) => tracing::info!(recovered, "Interrupted jobs reset"),
        Err(e) => tracing::error!(error = %e, "Failed to recover interrupted jobs"),
    }

    match state.retention.sweep().await {
        Ok(report) => tracing::info!(
            scanned = report.scanned,
            evicted = report.evicted.len(),
            "Startup retention sweep finished",
        ),
        Err(e) => tracing::error!(error = %e, "Startup retention sweep failed"),
    }

    // --- Background tasks ---
    let background_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(background::retention::run(
        Arc::clone(&state.retention),
        Duration::from_secs(config.retention_sweep_interval_secs),
        background_cancel.clone(),
    ));

    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&state.ws_manager), background_cancel.clone());

    // --- Router ---
    let orchestrator = Arc::clone(&state.orchestrator);
    let ws_manager = Arc::clone(&state.ws_manager);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    background_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    tracing::info!("Background tasks stopped");

    // Cancel running downloads; each records `error` and closes its observers.
    orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    tracing::info!("Jobs stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
