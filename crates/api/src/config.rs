use std::path::PathBuf;
use std::str::FromStr;

use mediaflow_core::request::validate_format;
use mediaflow_pipeline::YtDlpConfig;

/// Invalid configuration value; startup aborts on it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for in-flight jobs at shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Root of the per-fingerprint artifact directories.
    pub download_dir: PathBuf,
    /// JSON file backing the status store.
    pub status_store_path: PathBuf,
    /// Download tool invocation settings.
    pub ytdlp: YtDlpConfig,
    /// Interval of the periodic retention sweep (default: 12 h).
    pub retention_sweep_interval_secs: u64,
    /// Byte budget of the download directory (default: 2 GiB).
    pub retention_max_bytes: u64,
    /// How often WebSocket sessions re-read the status store.
    pub status_poll_interval_secs: u64,
    /// Format used when a request omits one.
    pub default_format: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `HOST`                          | `0.0.0.0`               |
    /// | `PORT`                          | `3000`                  |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`                    |
    /// | `DOWNLOAD_DIR`                  | `downloads`             |
    /// | `STATUS_STORE_PATH`             | `status.json`           |
    /// | `YTDLP_BINARY`                  | `yt-dlp`                |
    /// | `YTDLP_CONCURRENT_FRAGMENTS`    | `4`                     |
    /// | `YTDLP_FRAGMENT_RETRIES`        | `10`                    |
    /// | `YTDLP_RETRIES`                 | `10`                    |
    /// | `YTDLP_EXTRACTOR_RETRIES`       | `3`                     |
    /// | `YTDLP_DEFAULT_QUALITY`         | `720`                   |
    /// | `RETENTION_SWEEP_INTERVAL_SECS` | `43200`                 |
    /// | `RETENTION_MAX_BYTES`           | `2147483648`            |
    /// | `STATUS_POLL_INTERVAL_SECS`     | `2`                     |
    /// | `DEFAULT_FORMAT`                | `mp3`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cors_origins: Vec<String> = string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let default_quality = string("YTDLP_DEFAULT_QUALITY", "720");
        if default_quality.is_empty() || !default_quality.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                key: "YTDLP_DEFAULT_QUALITY",
                value: default_quality,
            });
        }

        let default_format = string("DEFAULT_FORMAT", "mp3");
        if validate_format(&default_format).is_err() {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_FORMAT",
                value: default_format,
            });
        }

        // Both drive `tokio::time::interval`, which rejects a zero period.
        let status_poll_interval_secs = parse_interval(&lookup, "STATUS_POLL_INTERVAL_SECS", 2)?;
        let retention_sweep_interval_secs =
            parse_interval(&lookup, "RETENTION_SWEEP_INTERVAL_SECS", 43_200)?;

        Ok(Self {
            host: string("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3000)?,
            cors_origins,
            request_timeout_secs: parse(&lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: parse(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?,
            download_dir: PathBuf::from(string("DOWNLOAD_DIR", "downloads")),
            status_store_path: PathBuf::from(string("STATUS_STORE_PATH", "status.json")),
            ytdlp: YtDlpConfig {
                binary: string("YTDLP_BINARY", "yt-dlp"),
                concurrent_fragments: parse(&lookup, "YTDLP_CONCURRENT_FRAGMENTS", 4)?,
                fragment_retries: parse(&lookup, "YTDLP_FRAGMENT_RETRIES", 10)?,
                retries: parse(&lookup, "YTDLP_RETRIES", 10)?,
                extractor_retries: parse(&lookup, "YTDLP_EXTRACTOR_RETRIES", 3)?,
                default_quality,
            },
            retention_sweep_interval_secs,
            retention_max_bytes: parse(&lookup, "RETENTION_MAX_BYTES", 2 * 1024 * 1024 * 1024)?,
            status_poll_interval_secs,
            default_format,
        })
    }
}

/// Parse a period in seconds that must be non-zero.
fn parse_interval(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse(lookup, key, default)? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        secs => Ok(secs),
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
