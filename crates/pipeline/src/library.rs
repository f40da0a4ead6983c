//! On-disk layout of stored artifacts.
//!
//! Every fingerprint owns `<download_dir>/<fingerprint>/`, holding the
//! artifacts produced by its job, an `.access` recency sidecar and, once
//! requested, a cached `playlist.zip`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use mediaflow_core::artifacts::{
    find_by_index, is_artifact_name, ArtifactRef, ACCESS_FILE_NAME, ARCHIVE_FILE_NAME,
};
use mediaflow_core::error::CoreError;
use mediaflow_core::fingerprint::is_valid_fingerprint;
use mediaflow_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Contents of the `.access` sidecar.
#[derive(Debug, Serialize, Deserialize)]
struct AccessInfo {
    last_accessed: Timestamp,
}

/// A single artifact resolved to its absolute path.
#[derive(Debug, Clone)]
pub struct ArtifactFile {
    pub artifact: ArtifactRef,
    pub path: PathBuf,
}

/// Filesystem view of the download directory.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owned by a fingerprint.
    pub fn job_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(fingerprint)
    }

    /// Create the download directory if missing.
    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Whether a fingerprint directory exists. I/O errors count as present.
    pub async fn has_job_dir(&self, fingerprint: &str) -> bool {
        tokio::fs::try_exists(self.job_dir(fingerprint))
            .await
            .unwrap_or(true)
    }

    /// Remove whatever a previous attempt left and create an empty
    /// directory for a new job.
    pub async fn prepare_job_dir(&self, fingerprint: &str) -> io::Result<PathBuf> {
        let dir = self.job_dir(fingerprint);
        self.remove_job_dir(fingerprint).await?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Delete a fingerprint directory. A missing directory is not an error.
    pub async fn remove_job_dir(&self, fingerprint: &str) -> io::Result<()> {
        match tokio::fs::remove_dir_all(self.job_dir(fingerprint)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Fingerprints that currently have a directory.
    pub async fn stored_fingerprints(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_fingerprint(name) {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Recency tracking
    // -----------------------------------------------------------------------

    /// Record an access now.
    pub async fn touch(&self, fingerprint: &str) -> io::Result<()> {
        self.touch_at(fingerprint, Utc::now()).await
    }

    /// Record an access at a specific instant.
    pub async fn touch_at(&self, fingerprint: &str, at: Timestamp) -> io::Result<()> {
        let path = self.job_dir(fingerprint).join(ACCESS_FILE_NAME);
        let data = serde_json::to_vec(&AccessInfo { last_accessed: at })?;
        tokio::fs::write(path, data).await
    }

    /// Last recorded access. `None` when the sidecar is missing or corrupt,
    /// which ranks the entry as the oldest.
    pub async fn last_accessed(&self, fingerprint: &str) -> Option<Timestamp> {
        let path = self.job_dir(fingerprint).join(ACCESS_FILE_NAME);
        let data = tokio::fs::read(path).await.ok()?;
        serde_json::from_slice::<AccessInfo>(&data)
            .ok()
            .map(|a| a.last_accessed)
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Artifacts stored for a fingerprint, ordered by playlist index then
    /// filename.
    pub async fn list(&self, fingerprint: &str) -> io::Result<Vec<ArtifactRef>> {
        let mut entries = tokio::fs::read_dir(self.job_dir(fingerprint)).await?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_artifact_name(&name) {
                out.push(ArtifactRef::from_filename(&name));
            }
        }
        out.sort_by(|a, b| {
            let ka = a.index.as_deref().and_then(|i| i.parse::<u64>().ok());
            let kb = b.index.as_deref().and_then(|i| i.parse::<u64>().ok());
            ka.cmp(&kb).then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(out)
    }

    /// Resolve one artifact for retrieval.
    ///
    /// With an index, the artifact whose `"<index> - "` prefix matches is
    /// returned. Without one, the single stored artifact is returned; a
    /// multi-item set requires an index (or the archive).
    pub async fn file(
        &self,
        fingerprint: &str,
        index: Option<&str>,
    ) -> Result<ArtifactFile, CoreError> {
        let artifacts = self.artifacts(fingerprint).await?;

        let artifact = match index {
            Some(index) => find_by_index(&artifacts, index).cloned().ok_or_else(|| {
                CoreError::NotFound {
                    entity: "Artifact",
                    id: format!("{fingerprint}#{index}"),
                }
            })?,
            None if artifacts.len() == 1 => artifacts[0].clone(),
            None => {
                return Err(CoreError::InvalidRequest(format!(
                    "{} artifacts stored; pass an index or request the archive",
                    artifacts.len()
                )))
            }
        };

        let path = self.job_dir(fingerprint).join(&artifact.filename);
        Ok(ArtifactFile { artifact, path })
    }

    /// Path of the bulk archive, building and caching it on first use.
    pub async fn archive(&self, fingerprint: &str) -> Result<PathBuf, CoreError> {
        let artifacts = self.artifacts(fingerprint).await?;
        let dir = self.job_dir(fingerprint);
        let archive_path = dir.join(ARCHIVE_FILE_NAME);

        if tokio::fs::metadata(&archive_path).await.is_ok() {
            return Ok(archive_path);
        }

        let names: Vec<String> = artifacts.into_iter().map(|a| a.filename).collect();
        let target = archive_path.clone();
        tokio::task::spawn_blocking(move || write_archive(&dir, &names, &target))
            .await
            .map_err(|e| CoreError::Internal(format!("archive task failed: {e}")))?
            .map_err(|e| CoreError::Internal(format!("failed to build archive: {e}")))?;

        tracing::info!(fingerprint, path = %archive_path.display(), "Archive built");
        Ok(archive_path)
    }

    /// Total size in bytes of everything under a fingerprint directory.
    pub async fn dir_size(&self, fingerprint: &str) -> io::Result<u64> {
        let mut total = 0;
        let mut stack = vec![self.job_dir(fingerprint)];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }

    /// Artifacts of a fingerprint, or `NotFound` when nothing is stored
    /// (including malformed fingerprints, which never reach the filesystem).
    pub async fn artifacts(&self, fingerprint: &str) -> Result<Vec<ArtifactRef>, CoreError> {
        let not_found = || CoreError::NotFound {
            entity: "Media",
            id: fingerprint.to_string(),
        };
        if !is_valid_fingerprint(fingerprint) {
            return Err(not_found());
        }
        match self.list(fingerprint).await {
            Ok(list) if !list.is_empty() => Ok(list),
            Ok(_) => Err(not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(CoreError::Internal(format!("failed to read artifacts: {e}"))),
        }
    }
}

/// Write `names` from `dir` into a zip at `target`. Each build goes through
/// its own hidden temporary file, so concurrent builders never share a
/// partial archive and a reader only ever sees a finished one.
fn write_archive(dir: &Path, names: &[String], target: &Path) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut zip = zip::ZipWriter::new(tmp.as_file_mut());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for name in names {
            let mut src = std::fs::File::open(dir.join(name))?;
            zip.start_file(name.as_str(), options).map_err(io::Error::other)?;
            io::copy(&mut src, &mut zip)?;
        }
        zip.finish().map_err(io::Error::other)?.flush()?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    const FP: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    async fn library_with(files: &[&str]) -> (tempfile::TempDir, MediaLibrary) {
        let tmp = tempfile::tempdir().unwrap();
        let library = MediaLibrary::new(tmp.path());
        let dir = library.prepare_job_dir(FP).await.unwrap();
        for name in files {
            tokio::fs::write(dir.join(name), name.as_bytes()).await.unwrap();
        }
        (tmp, library)
    }

    #[tokio::test]
    async fn lists_in_index_order_and_hides_bookkeeping() {
        let (_tmp, library) =
            library_with(&["10 - c.mp3", "2 - b.mp3", "1 - a.mp3", "x.part", "playlist.zip"]).await;
        library.touch(FP).await.unwrap();

        let names: Vec<_> = library
            .list(FP)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, vec!["1 - a.mp3", "2 - b.mp3", "10 - c.mp3"]);
    }

    #[tokio::test]
    async fn touch_round_trips() {
        let (_tmp, library) = library_with(&["a.mp3"]).await;
        assert_eq!(library.last_accessed(FP).await, None);

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        library.touch_at(FP, at).await.unwrap();
        assert_eq!(library.last_accessed(FP).await, Some(at));
    }

    #[tokio::test]
    async fn single_file_without_index() {
        let (_tmp, library) = library_with(&["Song.mp3"]).await;
        let file = library.file(FP, None).await.unwrap();
        assert_eq!(file.artifact.title, "Song");
        assert!(file.path.ends_with("Song.mp3"));
    }

    #[tokio::test]
    async fn multi_file_requires_index() {
        let (_tmp, library) = library_with(&["1 - a.mp3", "2 - b.mp3"]).await;
        assert_matches!(library.file(FP, None).await, Err(CoreError::InvalidRequest(_)));
        assert_eq!(library.file(FP, Some("2")).await.unwrap().artifact.title, "b");
        assert_matches!(
            library.file(FP, Some("3")).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn unknown_or_malformed_fingerprint_is_not_found() {
        let (_tmp, library) = library_with(&["a.mp3"]).await;
        assert_matches!(
            library.file(&"b".repeat(64), None).await,
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(
            library.file("../../etc", None).await,
            Err(CoreError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn archive_is_built_once_and_cached() {
        let (_tmp, library) = library_with(&["1 - a.mp3", "2 - b.mp3"]).await;

        let path = library.archive(FP).await.unwrap();
        let first = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<_> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["1 - a.mp3", "2 - b.mp3"]);
        assert_eq!(zip.by_name("1 - a.mp3").unwrap().size(), 9);

        let again = library.archive(FP).await.unwrap();
        assert_eq!(again, path);
        let second = tokio::fs::metadata(&again).await.unwrap().modified().unwrap();
        assert_eq!(first, second);

        // The cached archive is never listed as an artifact.
        assert_eq!(library.list(FP).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_archive_requests_all_succeed() {
        let (_tmp, library) = library_with(&[]).await;
        let dir = library.job_dir(FP);
        for n in 1..=4 {
            let body = vec![n as u8; 2 * 1024 * 1024];
            tokio::fs::write(dir.join(format!("{n} - item.mp3")), body).await.unwrap();
        }

        let builders: Vec<_> = (0..4)
            .map(|_| {
                let library = library.clone();
                tokio::spawn(async move { library.archive(FP).await })
            })
            .collect();
        for builder in builders {
            let path = builder.await.unwrap().unwrap();
            assert!(path.ends_with(ARCHIVE_FILE_NAME));
        }

        let file = std::fs::File::open(dir.join(ARCHIVE_FILE_NAME)).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 4);
        assert_eq!(zip.by_name("3 - item.mp3").unwrap().size(), 2 * 1024 * 1024);

        // No temporary build file is left behind.
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(!name.starts_with('.'), "leftover {name}");
        }
    }

    #[tokio::test]
    async fn ensure_root_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let library = MediaLibrary::new(tmp.path().join("nested/downloads"));
        library.ensure_root().await.unwrap();
        library.ensure_root().await.unwrap();
        assert!(tmp.path().join("nested/downloads").is_dir());
        assert!(library.stored_fingerprints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dir_size_counts_every_file() {
        let (_tmp, library) = library_with(&["abc.mp3", "de.mp3"]).await;
        assert_eq!(library.dir_size(FP).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn stored_fingerprints_ignores_foreign_entries() {
        let (tmp, library) = library_with(&["a.mp3"]).await;
        tokio::fs::create_dir(tmp.path().join("not-a-fingerprint")).await.unwrap();
        tokio::fs::write(tmp.path().join("status.json"), b"{}").await.unwrap();

        assert_eq!(library.stored_fingerprints().await.unwrap(), vec![FP.to_string()]);
    }
}
