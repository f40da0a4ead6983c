#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediaflow_core::job_events::ProgressEvent;
use mediaflow_core::request::{MediaRequest, MediaRequestParams};
use mediaflow_events::{HubMessage, NotificationHub, Subscription};
use mediaflow_pipeline::{
    DownloadError, DownloadJob, DownloadOutcome, JobOrchestrator, JobRegistry, MediaDownloader,
    MediaLibrary,
};
use mediaflow_store::MemoryStatusStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What a scripted execution does once released.
#[derive(Clone)]
pub enum Script {
    /// Emit `lines`, write `files` into the output directory, exit 0.
    Succeed { lines: Vec<String>, files: Vec<String> },
    /// Exit non-zero with the given stderr tail.
    Fail { exit_code: i32, stderr: Vec<String> },
    /// The binary could not be started.
    LaunchError,
}

/// A `MediaDownloader` that plays back a [`Script`].
///
/// When built with [`ScriptedDownloader::held`], every execution waits for
/// [`ScriptedDownloader::release`] (or cancellation) before running.
pub struct ScriptedDownloader {
    script: Mutex<Script>,
    release: Option<CancellationToken>,
    calls: AtomicUsize,
}

impl ScriptedDownloader {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            release: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn held(script: Script) -> Self {
        Self {
            release: Some(CancellationToken::new()),
            ..Self::new(script)
        }
    }

    pub fn release(&self) {
        if let Some(release) = &self.release {
            release.cancel();
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDownloader for ScriptedDownloader {
    async fn download(
        &self,
        job: &DownloadJob,
        lines: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(release) = &self.release {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = release.cancelled() => {}
            }
        }

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed { lines: out, files } => {
                for line in out {
                    let _ = lines.send(line);
                }
                for name in files {
                    tokio::fs::write(job.output_dir.join(&name), b"media").await?;
                }
                Ok(DownloadOutcome::succeeded())
            }
            Script::Fail { exit_code, stderr } => {
                Ok(DownloadOutcome::failed(Some(exit_code), stderr))
            }
            Script::LaunchError => Err(DownloadError::Launch {
                program: "yt-dlp".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
        }
    }
}

/// A single-file audio success.
pub fn single_mp3(title: &str) -> Script {
    Script::Succeed {
        lines: vec![format!("[ExtractAudio] Destination: /tmp/{title}.mp3")],
        files: vec![format!("{title}.mp3")],
    }
}

pub struct Harness {
    pub orchestrator: Arc<JobOrchestrator>,
    pub downloader: Arc<ScriptedDownloader>,
    pub store: Arc<MemoryStatusStore>,
    pub hub: Arc<NotificationHub>,
    pub registry: Arc<JobRegistry>,
    pub library: MediaLibrary,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(downloader: ScriptedDownloader) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let library = MediaLibrary::new(dir.path());
        let store = Arc::new(MemoryStatusStore::new());
        let hub = Arc::new(NotificationHub::new());
        let registry = Arc::new(JobRegistry::new());
        let downloader = Arc::new(downloader);

        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            hub.clone(),
            downloader.clone(),
            registry.clone(),
            library.clone(),
        ));

        Self {
            orchestrator,
            downloader,
            store,
            hub,
            registry,
            library,
            _dir: dir,
        }
    }
}

pub fn request(url: &str, format: &str) -> MediaRequest {
    MediaRequest::from_params(
        MediaRequestParams {
            url: url.to_string(),
            format: Some(format.to_string()),
            ..Default::default()
        },
        "mp3",
    )
    .unwrap()
}

/// Collect events until the hub closes the subscription.
pub async fn drain(mut subscription: Subscription) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .expect("subscription stalled");
        match next {
            Some(HubMessage::Event(event)) => events.push(event),
            Some(HubMessage::Close) | None => return events,
        }
    }
}

/// Wait until no job is executing.
pub async fn settle(orchestrator: &JobOrchestrator) {
    for _ in 0..500 {
        if orchestrator.active_jobs() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("jobs did not settle");
}

/// Wait until the downloader was invoked `n` times.
pub async fn wait_for_calls(downloader: &ScriptedDownloader, n: usize) {
    for _ in 0..500 {
        if downloader.calls() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("downloader was not invoked");
}
