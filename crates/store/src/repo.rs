//! Typed access to job statuses.

use mediaflow_core::status::{fingerprint_from_key, status_key, JobStatus};

use crate::{StatusStore, StoreError};

/// Typed status operations keyed by fingerprint.
pub struct StatusRepo;

impl StatusRepo {
    /// Current status of a fingerprint.
    ///
    /// Unknown stored values are logged and reported as absent, which the
    /// orchestrator treats like `error` (fresh processing).
    pub async fn get(
        store: &dyn StatusStore,
        fingerprint: &str,
    ) -> Result<Option<JobStatus>, StoreError> {
        let raw = store.get(&status_key(fingerprint)).await?;
        Ok(raw.and_then(|value| {
            let parsed = JobStatus::parse(&value);
            if parsed.is_none() {
                tracing::warn!(fingerprint, value = %value, "Unknown status value in store");
            }
            parsed
        }))
    }

    /// Persist a status for a fingerprint.
    pub async fn set(
        store: &dyn StatusStore,
        fingerprint: &str,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        store.set(&status_key(fingerprint), status.as_str()).await
    }

    /// Remove the status entry of a fingerprint.
    pub async fn clear(store: &dyn StatusStore, fingerprint: &str) -> Result<(), StoreError> {
        store.delete(&status_key(fingerprint)).await
    }

    /// All fingerprints currently recorded with `status`.
    pub async fn list_with_status(
        store: &dyn StatusStore,
        status: JobStatus,
    ) -> Result<Vec<String>, StoreError> {
        Ok(store
            .entries()
            .await?
            .into_iter()
            .filter(|(_, value)| JobStatus::parse(value) == Some(status))
            .filter_map(|(key, _)| fingerprint_from_key(&key).map(str::to_string))
            .collect())
    }

    /// Fingerprints whose entry is anything but `processing`.
    pub async fn list_settled(store: &dyn StatusStore) -> Result<Vec<String>, StoreError> {
        Ok(store
            .entries()
            .await?
            .into_iter()
            .filter(|(_, value)| JobStatus::parse(value) != Some(JobStatus::Processing))
            .filter_map(|(key, _)| fingerprint_from_key(&key).map(str::to_string))
            .collect())
    }
}
