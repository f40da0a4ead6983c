//! Job execution for media requests.
//!
//! [`JobOrchestrator`] resolves requests to ready artifacts or to a running
//! execution of a [`MediaDownloader`], publishing progress through the
//! shared [`NotificationHub`](mediaflow_events::NotificationHub).
//! [`RetentionManager`] keeps the download directory bounded.

pub mod downloader;
pub mod library;
pub mod orchestrator;
pub mod registry;
pub mod retention;

pub use downloader::{
    DownloadError, DownloadJob, DownloadOutcome, MediaDownloader, YtDlpConfig, YtDlpDownloader,
};
pub use library::{ArtifactFile, MediaLibrary};
pub use orchestrator::{JobOrchestrator, Resolution};
pub use registry::JobRegistry;
pub use retention::{RetentionManager, RetentionReport, StoredEntry};
