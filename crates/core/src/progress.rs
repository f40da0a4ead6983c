//! Decoding of the download tool's line-oriented progress output.
//!
//! The tool announces a destination file before it confirms the transfer of
//! the next playlist item. Only the pairing "destination seen, then
//! transfer marker" produces an `item` event; either marker alone yields
//! nothing (temporary and skipped entries also print destinations).

use std::path::Path;

use crate::job_events::ProgressEvent;
use crate::sanitize::{sanitize_title, split_extension};
use crate::types::Fingerprint;

/// Audio extraction finished writing its output file.
pub const AUDIO_DESTINATION_MARKER: &str = "[ExtractAudio] Destination:";
/// Video and audio streams are being merged into the output file.
pub const MERGE_DESTINATION_MARKER: &str = "[Merger] Merging formats into";
/// The tool moved on to the transfer of a playlist item.
pub const ITEM_TRANSFER_MARKER: &str = "[download] Downloading item";

/// Stateful parser for the output of a single execution.
#[derive(Debug)]
pub struct ProgressParser {
    fingerprint: Fingerprint,
    audio: bool,
    pending: Option<String>,
}

impl ProgressParser {
    /// `audio` selects which destination marker is recognized.
    pub fn new(fingerprint: impl Into<Fingerprint>, audio: bool) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            audio,
            pending: None,
        }
    }

    /// Feed one output line; returns an event when a destination/transfer
    /// pair completes.
    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        if let Some(name) = self.destination(line) {
            self.pending = Some(name);
            return None;
        }

        if line.contains(ITEM_TRANSFER_MARKER) {
            let name = self.pending.take()?;
            let (stem, _) = split_extension(&name);
            return Some(ProgressEvent::item(
                self.fingerprint.clone(),
                sanitize_title(stem),
            ));
        }

        None
    }

    /// Destination filename announced on this line, if any.
    fn destination(&self, line: &str) -> Option<String> {
        if self.audio {
            let (_, rest) = line.split_once(AUDIO_DESTINATION_MARKER)?;
            let path = rest.trim();
            if !path.ends_with(".mp3") {
                return None;
            }
            base_name(path)
        } else {
            let (_, rest) = line.split_once(MERGE_DESTINATION_MARKER)?;
            base_name(rest.trim().trim_matches('"'))
        }
    }
}

fn base_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}
