//! Recency-based eviction of stored artifacts.
//!
//! Two policies share the same eviction path:
//!
//! - the periodic **sweep** drops the least recently accessed half of the
//!   stored population;
//! - the **size cap** drops entries oldest-first until the download
//!   directory fits under the configured byte budget.
//!
//! Executing fingerprints are never candidates. A sweep also drops status
//! entries that no longer have artifacts on disk.

use std::sync::Arc;

use mediaflow_core::fingerprint::is_valid_fingerprint;
use mediaflow_core::status::JobStatus;
use mediaflow_core::types::{Fingerprint, Timestamp};
use mediaflow_store::{StatusRepo, StatusStore};

use crate::library::MediaLibrary;
use crate::registry::JobRegistry;

/// One stored fingerprint as seen by a retention pass.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub fingerprint: Fingerprint,
    /// `None` when no access was ever recorded; sorts before any instant.
    pub last_accessed: Option<Timestamp>,
    pub size_bytes: u64,
}

/// Outcome of one retention pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    pub scanned: usize,
    pub evicted: Vec<Fingerprint>,
    pub freed_bytes: u64,
    /// Status entries removed because their artifacts were gone.
    pub cleared_statuses: Vec<Fingerprint>,
}

/// Number of entries a sweep removes from a population of `population`.
pub fn sweep_count(population: usize) -> usize {
    if population < 2 {
        0
    } else {
        (population / 2).max(1)
    }
}

pub struct RetentionManager {
    library: MediaLibrary,
    store: Arc<dyn StatusStore>,
    registry: Arc<JobRegistry>,
    max_bytes: u64,
}

impl RetentionManager {
    pub fn new(
        library: MediaLibrary,
        store: Arc<dyn StatusStore>,
        registry: Arc<JobRegistry>,
        max_bytes: u64,
    ) -> Self {
        Self {
            library,
            store,
            registry,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Every stored fingerprint with its recency and size.
    pub async fn scan(&self) -> std::io::Result<Vec<StoredEntry>> {
        let mut entries = Vec::new();
        for fingerprint in self.library.stored_fingerprints().await? {
            // A directory can vanish between listing and sizing.
            let size_bytes = match self.library.dir_size(&fingerprint).await {
                Ok(size) => size,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            let last_accessed = self.library.last_accessed(&fingerprint).await;
            entries.push(StoredEntry {
                fingerprint,
                last_accessed,
                size_bytes,
            });
        }
        Ok(entries)
    }

    /// Remove the least recently accessed `max(1, N/2)` entries when at
    /// least two are stored.
    pub async fn sweep(&self) -> std::io::Result<RetentionReport> {
        let mut candidates = self.candidates(self.scan().await?);
        let mut report = RetentionReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        let count = sweep_count(candidates.len());
        for entry in candidates.drain(..count) {
            if self.evict(&entry.fingerprint).await {
                report.freed_bytes += entry.size_bytes;
                report.evicted.push(entry.fingerprint);
            }
        }

        if !report.evicted.is_empty() {
            tracing::info!(
                scanned = report.scanned,
                evicted = report.evicted.len(),
                freed_bytes = report.freed_bytes,
                "Retention sweep evicted entries",
            );
        }
        report.cleared_statuses = self.prune_statuses().await;
        Ok(report)
    }

    /// Clear settled status entries whose directory is gone.
    ///
    /// Failed jobs and `completed` entries whose directory disappeared
    /// outside [`Self::evict`] have nothing on disk for a sweep to find.
    pub async fn prune_statuses(&self) -> Vec<Fingerprint> {
        let settled = match StatusRepo::list_settled(self.store.as_ref()).await {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping status pruning");
                return Vec::new();
            }
        };

        let mut cleared = Vec::new();
        for fingerprint in settled {
            if !is_valid_fingerprint(&fingerprint) || self.library.has_job_dir(&fingerprint).await {
                continue;
            }
            let _gate = self.registry.lock(&fingerprint).await;
            if self.registry.is_active(&fingerprint) || self.library.has_job_dir(&fingerprint).await {
                continue;
            }
            // A new job may have claimed the fingerprint since the listing.
            match StatusRepo::get(self.store.as_ref(), &fingerprint).await {
                Ok(Some(JobStatus::Processing)) => continue,
                Err(e) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to read status");
                    continue;
                }
                Ok(_) => {}
            }
            if let Err(e) = StatusRepo::clear(self.store.as_ref(), &fingerprint).await {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to clear status");
                continue;
            }
            cleared.push(fingerprint);
        }

        if !cleared.is_empty() {
            tracing::info!(cleared = cleared.len(), "Cleared status entries without artifacts");
        }
        cleared
    }

    /// Remove entries oldest-first while the download directory exceeds
    /// the byte budget. Executing jobs count toward the total.
    pub async fn enforce_size_cap(&self) -> std::io::Result<RetentionReport> {
        let entries = self.scan().await?;
        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let candidates = self.candidates(entries);
        let mut report = RetentionReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for entry in candidates {
            if total <= self.max_bytes {
                break;
            }
            if self.evict(&entry.fingerprint).await {
                total = total.saturating_sub(entry.size_bytes);
                report.freed_bytes += entry.size_bytes;
                report.evicted.push(entry.fingerprint);
            }
        }

        if total > self.max_bytes {
            tracing::warn!(
                total_bytes = total,
                max_bytes = self.max_bytes,
                "Download directory still over budget after eviction",
            );
        } else if !report.evicted.is_empty() {
            tracing::info!(
                evicted = report.evicted.len(),
                freed_bytes = report.freed_bytes,
                "Size cap evicted entries",
            );
        }
        Ok(report)
    }

    /// Delete a fingerprint's artifacts and status entry.
    ///
    /// Returns `false` when the fingerprint started executing in the
    /// meantime or its directory could not be removed.
    pub async fn evict(&self, fingerprint: &str) -> bool {
        let _gate = self.registry.lock(fingerprint).await;
        if self.registry.is_active(fingerprint) {
            tracing::debug!(fingerprint, "Skipping eviction of executing job");
            return false;
        }

        if let Err(e) = self.library.remove_job_dir(fingerprint).await {
            tracing::error!(fingerprint, error = %e, "Failed to remove artifacts");
            return false;
        }
        // The missing directory already invalidates a stale `completed`.
        if let Err(e) = StatusRepo::clear(self.store.as_ref(), fingerprint).await {
            tracing::warn!(fingerprint, error = %e, "Failed to clear status of evicted job");
        }
        tracing::debug!(fingerprint, "Evicted");
        true
    }

    /// Non-executing entries, least recently accessed first.
    fn candidates(&self, entries: Vec<StoredEntry>) -> Vec<StoredEntry> {
        let active = self.registry.active();
        let mut candidates: Vec<_> = entries
            .into_iter()
            .filter(|e| !active.contains(&e.fingerprint))
            .collect();
        candidates.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        candidates
    }
}
