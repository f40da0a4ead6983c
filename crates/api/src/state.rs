use std::sync::Arc;

use mediaflow_events::NotificationHub;
use mediaflow_pipeline::{
    JobOrchestrator, JobRegistry, MediaDownloader, MediaLibrary, RetentionManager,
};
use mediaflow_store::StatusStore;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Resolves media requests to artifacts or running jobs.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Eviction of stored artifacts (periodic sweep and size cap).
    pub retention: Arc<RetentionManager>,
    /// Durable status map, probed by the health check.
    pub store: Arc<dyn StatusStore>,
    /// Open WebSocket sessions (heartbeat and shutdown).
    pub ws_manager: Arc<WsManager>,
}

impl AppState {
    /// Wire the pipeline together around a status store and a downloader.
    ///
    /// Used by `main` with the file store and yt-dlp, and by integration
    /// tests with in-memory fakes.
    pub fn assemble(
        config: ServerConfig,
        store: Arc<dyn StatusStore>,
        downloader: Arc<dyn MediaDownloader>,
    ) -> Self {
        let library = MediaLibrary::new(config.download_dir.clone());
        let hub = Arc::new(NotificationHub::new());
        let registry = Arc::new(JobRegistry::new());

        let retention = Arc::new(RetentionManager::new(
            library.clone(),
            Arc::clone(&store),
            Arc::clone(&registry),
            config.retention_max_bytes,
        ));
        let orchestrator = Arc::new(
            JobOrchestrator::new(Arc::clone(&store), hub, downloader, registry, library)
                .with_retention(Arc::clone(&retention)),
        );

        Self {
            config: Arc::new(config),
            orchestrator,
            retention,
            store,
            ws_manager: Arc::new(WsManager::new()),
        }
    }

    pub fn library(&self) -> &MediaLibrary {
        self.orchestrator.library()
    }
}
