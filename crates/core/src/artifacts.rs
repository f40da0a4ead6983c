//! Artifact naming conventions inside a fingerprint directory.
//!
//! Playlist items are written as `"<index> - <title>.<ext>"`; single items
//! as `"<title>.<ext>"`. The directory also holds bookkeeping files that are
//! never reported as artifacts.

use serde::Serialize;

use crate::sanitize::split_extension;

/// Recency sidecar written next to the artifacts.
pub const ACCESS_FILE_NAME: &str = ".access";
/// Lazily built bulk archive, cached alongside the artifacts.
pub const ARCHIVE_FILE_NAME: &str = "playlist.zip";

/// Extensions of partial files the tool leaves behind while transferring.
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "tmp"];

/// Separator between the playlist index and the title.
const INDEX_SEPARATOR: &str = " - ";

/// One stored artifact of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    /// Playlist index parsed from the filename prefix, if present.
    pub index: Option<String>,
    /// Title without index prefix and extension.
    pub title: String,
    /// Filename inside the fingerprint directory.
    pub filename: String,
}

impl ArtifactRef {
    /// Parse a stored filename into its index/title parts.
    pub fn from_filename(filename: &str) -> Self {
        let (stem, _) = split_extension(filename);
        let (index, title) = match stem.split_once(INDEX_SEPARATOR) {
            Some((idx, title)) if !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()) => {
                (Some(idx.to_string()), title.to_string())
            }
            _ => (None, stem.to_string()),
        };
        Self {
            index,
            title,
            filename: filename.to_string(),
        }
    }
}

/// Whether a directory entry is a user-facing artifact.
pub fn is_artifact_name(name: &str) -> bool {
    if name.starts_with('.') || name == ARCHIVE_FILE_NAME {
        return false;
    }
    match split_extension(name) {
        (_, Some(ext)) => !PARTIAL_EXTENSIONS.contains(&ext),
        (_, None) => true,
    }
}

/// Find the artifact whose index prefix equals `index`.
pub fn find_by_index<'a>(artifacts: &'a [ArtifactRef], index: &str) -> Option<&'a ArtifactRef> {
    artifacts
        .iter()
        .find(|a| a.index.as_deref() == Some(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_indexed_names() {
        let a = ArtifactRef::from_filename("3 - Some - Title.mp3");
        assert_eq!(a.index.as_deref(), Some("3"));
        assert_eq!(a.title, "Some - Title");
        assert_eq!(a.filename, "3 - Some - Title.mp3");
    }

    #[test]
    fn plain_names_have_no_index() {
        let a = ArtifactRef::from_filename("Live - Tour.mp4");
        assert_eq!(a.index, None);
        assert_eq!(a.title, "Live - Tour");
    }

    #[test]
    fn bookkeeping_files_are_not_artifacts() {
        assert!(!is_artifact_name(ACCESS_FILE_NAME));
        assert!(!is_artifact_name(ARCHIVE_FILE_NAME));
        assert!(!is_artifact_name("a.mp4.part"));
        assert!(!is_artifact_name("a.ytdl"));
        assert!(is_artifact_name("1 - a.mp3"));
    }

    #[test]
    fn finds_by_index() {
        let list: Vec<_> = ["1 - a.mp3", "2 - b.mp3", "10 - c.mp3"]
            .into_iter()
            .map(ArtifactRef::from_filename)
            .collect();
        assert_eq!(find_by_index(&list, "10").unwrap().title, "c");
        assert_eq!(find_by_index(&list, "1").unwrap().title, "a");
        assert!(find_by_index(&list, "4").is_none());
    }
}
