//! Start, attach to, or reuse the job behind a fingerprint.
//!
//! The orchestrator is the only component that launches the download tool
//! and the only writer of terminal statuses. Status transitions for one
//! fingerprint are serialized through the [`JobRegistry`] gate:
//!
//! ```text
//! absent | error ──resolve──▶ processing ──exit──▶ completed | error
//! completed (directory gone) ──resolve──▶ processing
//! ```

use std::sync::Arc;
use std::time::Duration;

use mediaflow_core::artifacts::ArtifactRef;
use mediaflow_core::job_events::{ProgressEvent, ProgressKind};
use mediaflow_core::progress::ProgressParser;
use mediaflow_core::request::MediaRequest;
use mediaflow_core::status::JobStatus;
use mediaflow_core::types::Fingerprint;
use mediaflow_events::{NotificationHub, Subscription};
use mediaflow_store::{StatusRepo, StatusStore, StoreError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::downloader::{DownloadError, DownloadJob, MediaDownloader};
use crate::library::MediaLibrary;
use crate::registry::JobRegistry;
use crate::retention::RetentionManager;

/// Result of [`JobOrchestrator::resolve`].
#[derive(Debug)]
pub enum Resolution {
    /// Artifacts already exist; nothing was started.
    Ready {
        fingerprint: Fingerprint,
        artifacts: Vec<ArtifactRef>,
    },
    /// A new execution was started for this caller.
    Accepted {
        fingerprint: Fingerprint,
        subscription: Subscription,
    },
    /// An execution was already running; the caller joined its observers.
    Attached {
        fingerprint: Fingerprint,
        subscription: Subscription,
    },
}

impl Resolution {
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Ready { fingerprint, .. }
            | Self::Accepted { fingerprint, .. }
            | Self::Attached { fingerprint, .. } => fingerprint,
        }
    }

    /// The live registration, unless the artifacts were ready.
    pub fn into_subscription(self) -> Option<Subscription> {
        match self {
            Self::Ready { .. } => None,
            Self::Accepted { subscription, .. } | Self::Attached { subscription, .. } => {
                Some(subscription)
            }
        }
    }
}

pub struct JobOrchestrator {
    store: Arc<dyn StatusStore>,
    hub: Arc<NotificationHub>,
    downloader: Arc<dyn MediaDownloader>,
    registry: Arc<JobRegistry>,
    library: MediaLibrary,
    retention: Option<Arc<RetentionManager>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn StatusStore>,
        hub: Arc<NotificationHub>,
        downloader: Arc<dyn MediaDownloader>,
        registry: Arc<JobRegistry>,
        library: MediaLibrary,
    ) -> Self {
        Self {
            store,
            hub,
            downloader,
            registry,
            library,
            retention: None,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Enforce the size cap after every completed job.
    pub fn with_retention(mut self, retention: Arc<RetentionManager>) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Number of executions currently running.
    pub fn active_jobs(&self) -> usize {
        self.registry.active_count()
    }

    /// Current stored status of a fingerprint.
    pub async fn status(&self, fingerprint: &str) -> Result<Option<JobStatus>, StoreError> {
        StatusRepo::get(self.store.as_ref(), fingerprint).await
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Reuse, attach to, or start the job for `request`.
    ///
    /// Never fails: a status store outage is treated as an absent entry,
    /// so the request starts a fresh execution unless one is already
    /// running in this process.
    pub async fn resolve(self: &Arc<Self>, request: &MediaRequest) -> Resolution {
        let fingerprint = request.fingerprint();
        let _gate = self.registry.lock(&fingerprint).await;

        if self.registry.is_active(&fingerprint) {
            let subscription = self.hub.register(&fingerprint).await;
            tracing::debug!(fingerprint = %fingerprint, "Attached to running job");
            return Resolution::Attached {
                fingerprint,
                subscription,
            };
        }

        let status = match StatusRepo::get(self.store.as_ref(), &fingerprint).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Status lookup failed, treating as absent");
                None
            }
        };

        match status {
            Some(JobStatus::Completed) => {
                match self.library.list(&fingerprint).await {
                    Ok(artifacts) if !artifacts.is_empty() => {
                        if let Err(e) = self.library.touch(&fingerprint).await {
                            tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to record access");
                        }
                        tracing::debug!(fingerprint = %fingerprint, "Artifacts ready");
                        return Resolution::Ready {
                            fingerprint,
                            artifacts,
                        };
                    }
                    _ => {
                        tracing::info!(fingerprint = %fingerprint, "Completed job has no artifacts on disk, re-executing");
                    }
                }
            }
            Some(JobStatus::Processing) => {
                // Owned by another instance sharing the store.
                let subscription = self.hub.register(&fingerprint).await;
                tracing::debug!(fingerprint = %fingerprint, "Attached to job processing elsewhere");
                return Resolution::Attached {
                    fingerprint,
                    subscription,
                };
            }
            Some(JobStatus::Error) | None => {}
        }

        if let Err(e) =
            StatusRepo::set(self.store.as_ref(), &fingerprint, JobStatus::Processing).await
        {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to record processing status");
        }
        self.registry.activate(&fingerprint);
        let subscription = self.hub.register(&fingerprint).await;

        let this = Arc::clone(self);
        let job_fingerprint = fingerprint.clone();
        let job_request = request.clone();
        self.tracker.spawn(async move {
            this.run_job(job_fingerprint, job_request).await;
        });

        tracing::info!(fingerprint = %fingerprint, url = %request.url, format = %request.format, "Job accepted");
        Resolution::Accepted {
            fingerprint,
            subscription,
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    async fn run_job(&self, fingerprint: Fingerprint, request: MediaRequest) {
        let output_dir = match self.library.prepare_job_dir(&fingerprint).await {
            Ok(dir) => dir,
            Err(e) => {
                let message = format!("failed to prepare output directory: {e}");
                self.on_external_event(ProgressEvent::error(fingerprint, message))
                    .await;
                return;
            }
        };
        if let Err(e) = self.library.touch(&fingerprint).await {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to record access");
        }

        self.on_external_event(ProgressEvent::started(fingerprint.clone()))
            .await;

        let job = DownloadJob {
            fingerprint: fingerprint.clone(),
            request,
            output_dir,
        };
        let (lines_tx, mut lines_rx) = mpsc::unbounded_channel();
        let mut parser = ProgressParser::new(fingerprint.clone(), job.request.is_audio());

        let download = self
            .downloader
            .download(&job, lines_tx, self.cancel.child_token());
        let consume = async {
            while let Some(line) = lines_rx.recv().await {
                if let Some(event) = parser.feed(&line) {
                    self.on_external_event(event).await;
                }
            }
        };
        let (result, ()) = tokio::join!(download, consume);

        let terminal = match result {
            Ok(outcome) if outcome.success => match self.library.list(&fingerprint).await {
                Ok(artifacts) if !artifacts.is_empty() => ProgressEvent::completed(
                    fingerprint,
                    artifacts.into_iter().map(|a| a.filename).collect(),
                ),
                Ok(_) => ProgressEvent::error(fingerprint, "download produced no files"),
                Err(e) => {
                    ProgressEvent::error(fingerprint, format!("failed to read artifacts: {e}"))
                }
            },
            Ok(outcome) => ProgressEvent::error(fingerprint, outcome.failure_message()),
            Err(DownloadError::Cancelled) => {
                ProgressEvent::error(fingerprint, "download cancelled by server shutdown")
            }
            Err(e) => ProgressEvent::error(fingerprint, e.to_string()),
        };
        self.on_external_event(terminal).await;
    }

    /// Forward a progress event to observers; terminal events also settle
    /// the job's status and close its observer group.
    pub async fn on_external_event(&self, event: ProgressEvent) {
        if !event.is_terminal() {
            self.hub.broadcast(&event).await;
            return;
        }

        let fingerprint = event.fingerprint.clone();
        let completed = matches!(event.kind, ProgressKind::Completed { .. });
        {
            let _gate = self.registry.lock(&fingerprint).await;

            if !completed {
                if let Err(e) = self.library.remove_job_dir(&fingerprint).await {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to remove partial artifacts");
                }
            }

            let status = if completed {
                JobStatus::Completed
            } else {
                JobStatus::Error
            };
            if let Err(e) = StatusRepo::set(self.store.as_ref(), &fingerprint, status).await {
                tracing::error!(fingerprint = %fingerprint, status = %status, error = %e, "Failed to record terminal status");
            }

            self.hub.broadcast(&event).await;
            self.hub.close_all(&fingerprint).await;
            self.registry.deactivate(&fingerprint);
        }

        match &event.kind {
            ProgressKind::Completed { artifacts } => {
                tracing::info!(fingerprint = %fingerprint, artifacts = artifacts.len(), "Job completed");
                if let Some(retention) = &self.retention {
                    if let Err(e) = retention.enforce_size_cap().await {
                        tracing::error!(error = %e, "Size cap enforcement failed");
                    }
                }
            }
            ProgressKind::Error { message } => {
                tracing::warn!(fingerprint = %fingerprint, error = %message, "Job failed");
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reset jobs a previous process left in `processing`.
    ///
    /// Their executions died with that process, so the partial artifacts
    /// are removed and the status becomes `error`, letting the next request
    /// start over.
    pub async fn recover_interrupted(&self) -> Result<usize, StoreError> {
        let stale =
            StatusRepo::list_with_status(self.store.as_ref(), JobStatus::Processing).await?;
        let mut recovered = 0;
        for fingerprint in stale {
            let _gate = self.registry.lock(&fingerprint).await;
            if self.registry.is_active(&fingerprint) {
                continue;
            }
            if let Err(e) = self.library.remove_job_dir(&fingerprint).await {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to remove partial artifacts");
            }
            StatusRepo::set(self.store.as_ref(), &fingerprint, JobStatus::Error).await?;
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(recovered, "Reset interrupted jobs");
        }
        Ok(recovered)
    }

    /// Cancel running executions, wait for them to settle (bounded by
    /// `timeout`), then close every observer group.
    pub async fn shutdown(&self, timeout: Duration) {
        let running = self.registry.active_count();
        if running > 0 {
            tracing::info!(running, "Cancelling in-flight jobs");
        }
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.registry.active_count(),
                "Timed out waiting for jobs to stop",
            );
        }
        self.hub.shutdown_all().await;
    }
}
