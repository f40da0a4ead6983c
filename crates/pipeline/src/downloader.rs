//! The external download tool seam.
//!
//! [`MediaDownloader`] is what the orchestrator drives; [`YtDlpDownloader`]
//! is the production implementation spawning `yt-dlp`. Tests substitute
//! scripted fakes.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use mediaflow_core::request::MediaRequest;
use mediaflow_core::types::Fingerprint;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Number of stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// Output template for playlist items; the index prefix is what retrieval
/// by index matches on.
pub const PLAYLIST_OUTPUT_TEMPLATE: &str = "%(playlist_index)s - %(title)s.%(ext)s";
/// Output template for single items.
pub const SINGLE_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// One execution handed to a downloader.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub fingerprint: Fingerprint,
    pub request: MediaRequest,
    /// Directory the artifacts must be written into.
    pub output_dir: PathBuf,
}

/// How an execution ended once the tool ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Last few stderr lines, newest last.
    pub stderr_tail: Vec<String>,
}

impl DownloadOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stderr_tail: Vec::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, stderr_tail: Vec<String>) -> Self {
        Self {
            success: false,
            exit_code,
            stderr_tail,
        }
    }

    /// Human-readable failure reason.
    pub fn failure_message(&self) -> String {
        let code = match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        match self.stderr_tail.last() {
            Some(line) => format!("download failed ({code}): {line}"),
            None => format!("download failed ({code})"),
        }
    }
}

/// Errors raised before or while driving the tool.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running download: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

/// Runs one download execution, streaming raw output lines to `lines`.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(
        &self,
        job: &DownloadJob,
        lines: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError>;
}

// ---------------------------------------------------------------------------
// yt-dlp
// ---------------------------------------------------------------------------

/// Tuning flags passed to every yt-dlp invocation.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    pub binary: String,
    pub concurrent_fragments: u32,
    pub fragment_retries: u32,
    pub retries: u32,
    pub extractor_retries: u32,
    /// Height cap used when a video request carries no quality.
    pub default_quality: String,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            concurrent_fragments: 4,
            fragment_retries: 10,
            retries: 10,
            extractor_retries: 3,
            default_quality: "720".to_string(),
        }
    }
}

/// Spawns `yt-dlp` as a child process.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    config: YtDlpConfig,
}

impl YtDlpDownloader {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for one job.
    pub fn build_args(&self, job: &DownloadJob) -> Vec<String> {
        let cfg = &self.config;
        let req = &job.request;

        let mut args = vec![
            "--newline".to_string(),
            "--concurrent-fragments".to_string(),
            cfg.concurrent_fragments.to_string(),
            "--fragment-retries".to_string(),
            cfg.fragment_retries.to_string(),
            "--retries".to_string(),
            cfg.retries.to_string(),
            "--extractor-retries".to_string(),
            cfg.extractor_retries.to_string(),
            "-o".to_string(),
            output_template(req.is_playlist).to_string(),
            "-P".to_string(),
            job.output_dir.to_string_lossy().into_owned(),
            "-f".to_string(),
            format_selector(req, &cfg.default_quality),
        ];

        if req.is_audio() {
            args.extend(["--extract-audio", "--audio-format", "mp3"].map(String::from));
        } else {
            args.push("--merge-output-format".to_string());
            args.push(req.format.clone());
        }

        if req.is_playlist {
            args.push("--yes-playlist".to_string());
            if !req.index.is_empty() {
                args.push("--playlist-items".to_string());
                args.push(req.index.clone());
            }
        } else {
            args.push("--no-playlist".to_string());
        }

        args.push("--".to_string());
        args.push(req.url.clone());
        args
    }
}

/// Output filename template.
pub fn output_template(is_playlist: bool) -> &'static str {
    if is_playlist {
        PLAYLIST_OUTPUT_TEMPLATE
    } else {
        SINGLE_OUTPUT_TEMPLATE
    }
}

/// `-f` selector: best audio for audio jobs, height-capped video otherwise.
pub fn format_selector(req: &MediaRequest, default_quality: &str) -> String {
    if req.is_audio() {
        return "bestaudio/best".to_string();
    }
    let height = if req.quality.is_empty() {
        default_quality
    } else {
        req.quality.as_str()
    };
    format!("bestvideo[height<={height}]+bestaudio/best[height<={height}]")
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(
        &self,
        job: &DownloadJob,
        lines: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Result<DownloadOutcome, DownloadError> {
        let args = self.build_args(job);
        tracing::debug!(
            fingerprint = %job.fingerprint,
            binary = %self.config.binary,
            ?args,
            "Spawning download tool",
        );

        // `kill_on_drop(true)` makes sure a cancelled job leaves no orphan.
        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::Launch {
                program: self.config.binary.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = tokio::spawn(forward_lines(stdout, lines));
        let stderr_task = tokio::spawn(tail_lines(stderr));

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(fingerprint = %job.fingerprint, error = %e, "Failed to kill download tool");
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(DownloadError::Cancelled);
            }
            status = child.wait() => status?,
        };

        // Drain remaining output so every line reaches the parser before
        // the terminal event is synthesized.
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(DownloadOutcome::succeeded())
        } else {
            Ok(DownloadOutcome::failed(status.code(), stderr_tail))
        }
    }
}

/// Read one newline-terminated line, decoding invalid UTF-8 lossily.
/// Returns `None` at EOF.
async fn next_line_lossy<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Forward each line of `stream` until EOF. Reading continues after the
/// receiver goes away so the tool never writes into a closed pipe.
async fn forward_lines<R: AsyncRead + Unpin>(stream: Option<R>, lines: mpsc::UnboundedSender<String>) {
    let Some(stream) = stream else { return };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut forwarding = true;
    while let Ok(Some(line)) = next_line_lossy(&mut reader, &mut buf).await {
        if forwarding && lines.send(line).is_err() {
            forwarding = false;
        }
    }
}

/// Keep the last [`STDERR_TAIL_LINES`] non-empty lines of `stream`.
async fn tail_lines<R: AsyncRead + Unpin>(stream: Option<R>) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    if let Some(stream) = stream {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        while let Ok(Some(line)) = next_line_lossy(&mut reader, &mut buf).await {
            if line.trim().is_empty() {
                continue;
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
    tail.into()
}

#[cfg(test)]
mod tests {
    use mediaflow_core::job_events::ProgressEvent;
    use mediaflow_core::progress::ProgressParser;
    use mediaflow_core::request::MediaRequestParams;

    use super::*;

    fn job(params: MediaRequestParams) -> DownloadJob {
        let request = MediaRequest::from_params(params, "mp3").unwrap();
        DownloadJob {
            fingerprint: request.fingerprint(),
            request,
            output_dir: PathBuf::from("/data/abc"),
        }
    }

    fn params(url: &str, format: &str) -> MediaRequestParams {
        MediaRequestParams {
            url: url.to_string(),
            format: Some(format.to_string()),
            ..Default::default()
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).map(String::as_str)
    }

    #[test]
    fn audio_single_item_arguments() {
        let downloader = YtDlpDownloader::new(YtDlpConfig::default());
        let args = downloader.build_args(&job(params("https://x/1", "mp3")));

        assert_eq!(args[0], "--newline");
        assert_eq!(value_after(&args, "--concurrent-fragments"), Some("4"));
        assert_eq!(value_after(&args, "--fragment-retries"), Some("10"));
        assert_eq!(value_after(&args, "--retries"), Some("10"));
        assert_eq!(value_after(&args, "--extractor-retries"), Some("3"));
        assert_eq!(value_after(&args, "-o"), Some(SINGLE_OUTPUT_TEMPLATE));
        assert_eq!(value_after(&args, "-P"), Some("/data/abc"));
        assert_eq!(value_after(&args, "-f"), Some("bestaudio/best"));
        assert_eq!(value_after(&args, "--audio-format"), Some("mp3"));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--merge-output-format".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--", "https://x/1"]);
    }

    #[test]
    fn video_playlist_with_items() {
        let downloader = YtDlpDownloader::new(YtDlpConfig::default());
        let mut p = params("https://x/list", "mkv");
        p.quality = Some("1080".to_string());
        p.playlist = Some("true".to_string());
        p.index = Some("2-4".to_string());
        let args = downloader.build_args(&job(p));

        assert_eq!(value_after(&args, "-o"), Some(PLAYLIST_OUTPUT_TEMPLATE));
        assert_eq!(
            value_after(&args, "-f"),
            Some("bestvideo[height<=1080]+bestaudio/best[height<=1080]")
        );
        assert_eq!(value_after(&args, "--merge-output-format"), Some("mkv"));
        assert_eq!(value_after(&args, "--playlist-items"), Some("2-4"));
        assert!(args.contains(&"--yes-playlist".to_string()));
        assert!(!args.contains(&"--extract-audio".to_string()));
    }

    #[test]
    fn video_without_quality_uses_default_height() {
        let downloader = YtDlpDownloader::new(YtDlpConfig {
            default_quality: "480".to_string(),
            ..Default::default()
        });
        let args = downloader.build_args(&job(params("https://x/1", "mp4")));
        assert_eq!(
            value_after(&args, "-f"),
            Some("bestvideo[height<=480]+bestaudio/best[height<=480]")
        );
    }

    #[test]
    fn failure_message_includes_last_stderr_line() {
        let outcome = DownloadOutcome::failed(Some(1), vec!["a".into(), "ERROR: gone".into()]);
        assert_eq!(outcome.failure_message(), "download failed (exit code 1): ERROR: gone");
        assert_eq!(
            DownloadOutcome::failed(None, vec![]).failure_message(),
            "download failed (terminated by signal)"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let downloader = YtDlpDownloader::new(YtDlpConfig {
            binary: "/nonexistent/mediaflow-yt-dlp".to_string(),
            ..Default::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = downloader
            .download(&job(params("https://x/1", "mp3")), tx, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DownloadError::Launch { .. })));
    }

    // ---- Test: tool output that is not valid UTF-8 ----

    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_output_is_decoded_lossily() {
        let tmp = tempfile::tempdir().unwrap();
        let binary = fake_tool(
            tmp.path(),
            r#"printf '[youtube] caf\351\n'
printf '[ExtractAudio] Destination: /d/1 - Caf\351.mp3\n'
printf '[download] Downloading item 2 of 2\n'
printf 'ERROR: bad \377 byte\n' >&2
exit 3
"#,
        );
        let downloader = YtDlpDownloader::new(YtDlpConfig {
            binary,
            ..Default::default()
        });
        let job = job(params("https://x/1", "mp3"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = downloader
            .download(&job, tx, CancellationToken::new())
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[youtube] caf\u{FFFD}");

        let mut parser = ProgressParser::new(job.fingerprint.clone(), true);
        let events: Vec<_> = lines.iter().filter_map(|l| parser.feed(l)).collect();
        assert_eq!(events, vec![ProgressEvent::item(job.fingerprint.clone(), "1 Caf")]);

        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_tail, vec!["ERROR: bad \u{FFFD} byte".to_string()]);
    }
}
