//! Job status vocabulary stored in the status store.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of every status store key.
pub const STATUS_KEY_PREFIX: &str = "media:";

/// Persisted lifecycle state of a fingerprint.
///
/// "Absent" is not a variant: it is represented by a missing store entry
/// and handled exactly like [`JobStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// String value written to the store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parse a stored value. Unknown values yield `None` and are treated
    /// like an absent entry by callers.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether no further transitions follow without a new request.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the status store key for a fingerprint.
pub fn status_key(fingerprint: &str) -> String {
    format!("{STATUS_KEY_PREFIX}{fingerprint}")
}

/// Extract the fingerprint from a status store key.
pub fn fingerprint_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(STATUS_KEY_PREFIX)
}
