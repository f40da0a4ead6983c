//! Progress events emitted while a download job runs.
//!
//! Serialized as flat JSON objects tagged by `type`, e.g.
//! `{"type":"item","fingerprint":"…","title":"Song"}`. These are the
//! messages WebSocket observers receive.

use serde::{Deserialize, Serialize};

use crate::types::Fingerprint;

/// Job execution started.
pub const MSG_TYPE_STARTED: &str = "started";
/// One playlist item materialized.
pub const MSG_TYPE_ITEM: &str = "item";
/// Job completed successfully.
pub const MSG_TYPE_COMPLETED: &str = "completed";
/// Job failed.
pub const MSG_TYPE_ERROR: &str = "error";

/// Kind-specific payload of a [`ProgressEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressKind {
    Started,
    Item { title: String },
    Completed { artifacts: Vec<String> },
    Error { message: String },
}

/// One ordered unit of job progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub fingerprint: Fingerprint,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn started(fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            kind: ProgressKind::Started,
        }
    }

    pub fn item(fingerprint: impl Into<Fingerprint>, title: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            kind: ProgressKind::Item {
                title: title.into(),
            },
        }
    }

    pub fn completed(fingerprint: impl Into<Fingerprint>, artifacts: Vec<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            kind: ProgressKind::Completed { artifacts },
        }
    }

    pub fn error(fingerprint: impl Into<Fingerprint>, message: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            kind: ProgressKind::Error {
                message: message.into(),
            },
        }
    }

    /// `completed` and `error` end the event stream for a fingerprint.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressKind::Completed { .. } | ProgressKind::Error { .. }
        )
    }

    /// Wire name of the event kind.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ProgressKind::Started => MSG_TYPE_STARTED,
            ProgressKind::Item { .. } => MSG_TYPE_ITEM,
            ProgressKind::Completed { .. } => MSG_TYPE_COMPLETED,
            ProgressKind::Error { .. } => MSG_TYPE_ERROR,
        }
    }
}
