//! ffmpeg clip extraction
//!
//! Cuts `[start, start + duration)` out of the downloaded source and
//! re-encodes it to H.264/AAC MP4. The seek is placed before `-i`, so ffmpeg
//! jumps to the nearest keyframe instead of decoding up to the cut point:
//! fast, at the cost of frame accuracy on the first frames.
//!
//! Success is judged by the output file alone. Exit status and stderr are
//! kept for the error message only.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_TRANSCODE_TIMEOUT_SECS;
use crate::error::{ClipError, Result};
use crate::timestamp::format_timestamp;

/// Diagnostics kept from ffmpeg's stderr, in characters.
pub const MAX_DIAGNOSTIC_LEN: usize = 300;

/// Cap on stderr bytes buffered from one run.
const STDERR_CAP: u64 = 64 * 1024;

/// Trait for cutting a clip out of a local source file.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write `duration` seconds starting at `start` from `input` to `output`.
    ///
    /// Must return before `deadline`, terminating any child process it started.
    async fn transcode(
        &self,
        input: &Path,
        start: u64,
        duration: u64,
        output: &Path,
        deadline: Instant,
    ) -> Result<()>;
}

/// ffmpeg subprocess transcoder
pub struct FfmpegTranscoder {
    /// Path to ffmpeg binary
    ffmpeg_path: PathBuf,
    /// Hard wall-clock limit for one run
    timeout: Duration,
    video_codec: String,
    audio_codec: String,
    preset: String,
}

impl FfmpegTranscoder {
    /// Create a transcoder, searching for ffmpeg in PATH
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"));

        Self {
            ffmpeg_path,
            timeout: Duration::from_secs(DEFAULT_TRANSCODE_TIMEOUT_SECS),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "veryfast".to_string(),
        }
    }

    /// Specify custom ffmpeg binary path
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Build ffmpeg command arguments
    fn build_args(&self, input: &Path, start: u64, duration: u64, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect();

        // Input seek: before -i
        args.push("-ss".to_string());
        args.push(format_timestamp(start));

        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());

        args.push("-t".to_string());
        args.push(duration.to_string());

        args.extend([
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            // Moov atom up front so players can start before the download ends
            "-movflags".to_string(),
            "+faststart".to_string(),
        ]);

        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Check if ffmpeg is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[instrument(skip(self, input, output, deadline))]
    async fn transcode(
        &self,
        input: &Path,
        start: u64,
        duration: u64,
        output: &Path,
        deadline: Instant,
    ) -> Result<()> {
        let args = self.build_args(input, start, duration, output);
        debug!("ffmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClipError::TranscodeFailed(format!(
                    "could not start {}: {e}",
                    self.ffmpeg_path.display()
                ))
            })?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(stderr) = stderr {
                // Errors here only lose diagnostics.
                let _ = stderr.take(STDERR_CAP).read_to_end(&mut buf).await;
            }
            buf
        });

        let limit = self
            .timeout
            .min(deadline.saturating_duration_since(Instant::now()));
        let started = Instant::now();

        let waited = tokio::time::timeout(limit, child.wait()).await;
        let status = if let Ok(status) = waited {
            status?
        } else {
            warn!(
                elapsed_secs = started.elapsed().as_secs(),
                "ffmpeg timed out, killing"
            );
            if let Err(e) = child.start_kill() {
                debug!("kill failed (already exited?): {e}");
            }
            // Reap so no zombie is left behind.
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(ClipError::TranscodeTimeout(whole_secs_ceil(limit)));
        };

        let diagnostics = stderr_task.await.unwrap_or_default();
        let produced = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        if produced > 0 {
            if !status.success() {
                warn!(%status, "ffmpeg reported failure but produced output");
            }
            info!(
                bytes = produced,
                elapsed_ms = started.elapsed().as_millis(),
                "Clip transcoded"
            );
            Ok(())
        } else {
            let detail = sanitize_diagnostics(&String::from_utf8_lossy(&diagnostics));
            warn!(%status, detail = %detail, "ffmpeg produced no output");
            Err(ClipError::TranscodeFailed(format!(
                "ffmpeg exited with {status}: {detail}"
            )))
        }
    }
}

/// Seconds rounded up, so a sub-second limit never reads as `0s`.
fn whole_secs_ceil(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

/// Collapse whitespace, drop control characters, keep the last
/// [`MAX_DIAGNOSTIC_LEN`] characters (ffmpeg puts the cause last).
pub fn sanitize_diagnostics(raw: &str) -> String {
    let cleaned = raw
        .split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let count = cleaned.chars().count();
    if count <= MAX_DIAGNOSTIC_LEN {
        cleaned
    } else {
        let tail: String = cleaned.chars().skip(count - MAX_DIAGNOSTIC_LEN).collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new().with_ffmpeg_path("ffmpeg")
    }

    #[test]
    fn test_build_args_seek_before_input() {
        let args = transcoder().build_args(
            Path::new("/tmp/src.mp4"),
            3723,
            45,
            Path::new("/tmp/out.mp4"),
        );

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "01:02:03");
        assert_eq!(args[input + 1], "/tmp/src.mp4");

        let t = args.iter().position(|a| a == "-t").unwrap();
        assert!(t > input);
        assert_eq!(args[t + 1], "45");
    }

    #[test]
    fn test_build_args_codecs_and_output() {
        let args = transcoder().build_args(
            Path::new("/tmp/src.mp4"),
            0,
            10,
            Path::new("/tmp/out.mp4"),
        );

        assert!(args.contains(&"-y".to_string()));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "veryfast"]));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn sanitize_strips_and_truncates() {
        assert_eq!(
            sanitize_diagnostics("  line one\n\x1b[31mline\ttwo\r\n"),
            "line one [31mline two"
        );

        let long = "x".repeat(1000) + " the real cause";
        let sanitized = sanitize_diagnostics(&long);
        assert!(sanitized.ends_with("the real cause"));
        assert!(sanitized.chars().count() <= MAX_DIAGNOSTIC_LEN + 3);
    }

    #[test]
    fn timeout_seconds_round_up() {
        assert_eq!(whole_secs_ceil(Duration::from_millis(400)), 1);
        assert_eq!(whole_secs_ceil(Duration::from_secs(300)), 300);
        assert_eq!(whole_secs_ceil(Duration::from_millis(2001)), 3);
        assert_eq!(whole_secs_ceil(Duration::ZERO), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_transcode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new().with_ffmpeg_path("/nonexistent/ffmpeg");
        let err = transcoder
            .transcode(
                &dir.path().join("in.mp4"),
                0,
                10,
                &dir.path().join("out.mp4"),
                Instant::now() + Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClipError::TranscodeFailed(_)));
    }

    #[tokio::test]
    async fn check_available_false_for_missing_binary() {
        let transcoder = FfmpegTranscoder::new().with_ffmpeg_path("/nonexistent/ffmpeg");
        assert!(!transcoder.check_available().await);
    }
}
