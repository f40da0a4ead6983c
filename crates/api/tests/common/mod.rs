#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mediaflow_api::config::ServerConfig;
use mediaflow_api::router::build_app_router;
use mediaflow_api::state::AppState;
use mediaflow_pipeline::{DownloadError, DownloadJob, DownloadOutcome, MediaDownloader, YtDlpConfig};
use mediaflow_store::MemoryStatusStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults rooted at `download_dir`.
pub fn test_config(download_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        download_dir: download_dir.to_path_buf(),
        status_store_path: download_dir.join("status.json"),
        ytdlp: YtDlpConfig::default(),
        retention_sweep_interval_secs: 3600,
        retention_max_bytes: u64::MAX,
        status_poll_interval_secs: 1,
        default_format: "mp3".to_string(),
    }
}

/// Downloader that writes fixed files after an optional hold.
pub struct FakeDownloader {
    pub files: Vec<String>,
    pub lines: Vec<String>,
    pub release: CancellationToken,
    pub calls: AtomicUsize,
}

impl FakeDownloader {
    /// Runs immediately.
    pub fn instant(files: &[&str]) -> Self {
        let release = CancellationToken::new();
        release.cancel();
        Self::with_release(files, release)
    }

    /// Waits until `release` is cancelled.
    pub fn with_release(files: &[&str], release: CancellationToken) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            lines: Vec::new(),
            release,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(
        &self,
        job: &DownloadJob,
        lines: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            _ = self.release.cancelled() => {}
        }
        for line in &self.lines {
            let _ = lines.send(line.clone());
        }
        for name in &self.files {
            tokio::fs::write(job.output_dir.join(name), b"media-bytes").await?;
        }
        Ok(DownloadOutcome::succeeded())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStatusStore>,
    pub downloader: Arc<FakeDownloader>,
    pub dir: tempfile::TempDir,
}

/// Build the full application router over an in-memory store and `downloader`.
///
/// Uses the same router builder as `main.rs` so integration tests exercise
/// the production middleware stack.
pub fn build_test_app(downloader: FakeDownloader) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let store = Arc::new(MemoryStatusStore::new());
    let downloader = Arc::new(downloader);

    let state = AppState::assemble(config.clone(), store.clone(), downloader.clone());
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        store,
        downloader,
        dir,
    }
}

/// Send a GET request and return the response.
pub async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(app: &Router, uri: &str, json: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Read a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read a response body as raw bytes.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Submit `body` until the job reports completed.
pub async fn submit_until_ready(app: &Router, body: serde_json::Value) -> serde_json::Value {
    for _ in 0..200 {
        let response = post_json(app, "/api/v1/media", body.clone()).await;
        if response.status() == StatusCode::OK {
            return body_json(response).await;
        }
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never completed");
}
