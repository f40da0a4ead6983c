//! Media request parameters, validation and normalization.
//!
//! Raw parameters arrive as strings (query string or JSON body). They are
//! validated and normalized into a [`MediaRequest`] before fingerprinting,
//! so invalid input is rejected before it can create any state.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fingerprint;
use crate::types::Fingerprint;

// ---------------------------------------------------------------------------
// Format constants
// ---------------------------------------------------------------------------

/// Audio-only extraction to MP3.
pub const FORMAT_MP3: &str = "mp3";
/// Video merged into an MP4 container.
pub const FORMAT_MP4: &str = "mp4";
/// Video merged into a Matroska container.
pub const FORMAT_MKV: &str = "mkv";
/// Video merged into a WebM container.
pub const FORMAT_WEBM: &str = "webm";

/// All accepted output formats.
pub const VALID_FORMATS: &[&str] = &[FORMAT_MP3, FORMAT_MP4, FORMAT_MKV, FORMAT_WEBM];

/// Playlist item selection: `3`, `1,3`, `2-5`, `1,4-6`.
static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(-\d+)?(,\d+(-\d+)?)*$").expect("valid index regex"));

// ---------------------------------------------------------------------------
// Raw parameters
// ---------------------------------------------------------------------------

/// Request parameters exactly as received from the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaRequestParams {
    #[serde(default)]
    pub url: String,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub playlist: Option<String>,
    pub index: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalized request
// ---------------------------------------------------------------------------

/// A validated, normalized download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub format: String,
    pub quality: String,
    pub is_playlist: bool,
    pub index: String,
}

impl MediaRequest {
    /// Validate raw parameters and build a normalized request.
    ///
    /// `default_format` is used when the client omits `format`. The URL,
    /// quality and index are kept verbatim apart from trimming surrounding
    /// whitespace; only the playlist flag is canonicalized.
    pub fn from_params(
        params: MediaRequestParams,
        default_format: &str,
    ) -> Result<Self, CoreError> {
        let url = params.url.trim().to_string();
        validate_url(&url)?;

        let format = params
            .format
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| default_format.to_string());
        validate_format(&format)?;

        let quality = params.quality.unwrap_or_default().trim().to_string();
        validate_quality(&quality)?;

        let is_playlist = parse_flag(params.playlist.as_deref().unwrap_or(""))?;

        let index = params.index.unwrap_or_default().trim().to_string();
        validate_index(&index)?;

        Ok(Self {
            url,
            format,
            quality,
            is_playlist,
            index,
        })
    }

    /// Stable fingerprint of this request.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint::fingerprint(
            &self.url,
            &self.format,
            &self.quality,
            self.is_playlist,
            &self.index,
        )
    }

    /// Whether this request extracts audio only.
    pub fn is_audio(&self) -> bool {
        self.format == FORMAT_MP3
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a source URL is non-empty and starts with `http(s)://`.
pub fn validate_url(url: &str) -> Result<(), CoreError> {
    if url.is_empty() {
        return Err(CoreError::InvalidRequest("url is required".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(CoreError::InvalidRequest(format!(
            "url must start with http:// or https://, got: '{url}'"
        )));
    }
    Ok(())
}

/// Validate that a format is one of [`VALID_FORMATS`].
pub fn validate_format(format: &str) -> Result<(), CoreError> {
    if VALID_FORMATS.contains(&format) {
        Ok(())
    } else {
        Err(CoreError::InvalidRequest(format!(
            "Unknown format: '{format}'. Valid formats: {}",
            VALID_FORMATS.join(", ")
        )))
    }
}

/// Quality is either empty (tool default) or a maximum video height.
pub fn validate_quality(quality: &str) -> Result<(), CoreError> {
    if quality.is_empty() || (quality.len() <= 5 && quality.bytes().all(|b| b.is_ascii_digit())) {
        Ok(())
    } else {
        Err(CoreError::InvalidRequest(format!(
            "quality must be a video height such as 720, got: '{quality}'"
        )))
    }
}

/// Index is either empty (all items) or a playlist item selection.
pub fn validate_index(index: &str) -> Result<(), CoreError> {
    if index.is_empty() || INDEX_RE.is_match(index) {
        Ok(())
    } else {
        Err(CoreError::InvalidRequest(format!(
            "index must look like 3, 1,3 or 2-5, got: '{index}'"
        )))
    }
}

/// Parse a boolean-like flag into its canonical value.
///
/// Comparison is case-insensitive and ignores surrounding whitespace, so
/// `"true"`, `"True"` and `" 1 "` all normalize to `true`. An empty value
/// means `false`.
pub fn parse_flag(raw: &str) -> Result<bool, CoreError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "" | "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CoreError::InvalidRequest(format!(
            "playlist must be a boolean, got: '{other}'"
        ))),
    }
}
