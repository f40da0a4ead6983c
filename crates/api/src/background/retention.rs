//! Periodic retention sweep of the download directory.
//!
//! Startup runs one sweep before serving; this loop repeats it every
//! `RETENTION_SWEEP_INTERVAL_SECS`.

use std::sync::Arc;
use std::time::Duration;

use mediaflow_pipeline::RetentionManager;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(retention: Arc<RetentionManager>, period: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = period.as_secs(),
        max_bytes = retention.max_bytes(),
        "Retention job started"
    );

    let mut interval = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention job stopping");
                break;
            }
            _ = interval.tick() => {
                match retention.sweep().await {
                    Ok(report) if report.evicted.is_empty() => {
                        tracing::debug!(scanned = report.scanned, "Retention: nothing to evict");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Retention: sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mediaflow_pipeline::{JobRegistry, MediaLibrary};
    use mediaflow_store::MemoryStatusStore;

    use super::*;

    #[tokio::test]
    async fn stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let retention = Arc::new(RetentionManager::new(
            MediaLibrary::new(dir.path()),
            Arc::new(MemoryStatusStore::new()),
            Arc::new(JobRegistry::new()),
            u64::MAX,
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(retention, Duration::from_secs(3600), cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn sweeps_on_each_tick() {
        let dir = tempfile::tempdir().unwrap();
        let library = MediaLibrary::new(dir.path());
        for n in 0..4u32 {
            library.prepare_job_dir(&format!("{n:064x}")).await.unwrap();
        }
        let retention = Arc::new(RetentionManager::new(
            library.clone(),
            Arc::new(MemoryStatusStore::new()),
            Arc::new(JobRegistry::new()),
            u64::MAX,
        ));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(retention, Duration::from_millis(20), cancel.clone()));

        let mut remaining = 4;
        for _ in 0..200 {
            remaining = library.stored_fingerprints().await.unwrap().len();
            if remaining <= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        // 4 -> 2 -> 1, then a single entry is left alone.
        assert_eq!(remaining, 1);
    }
}
