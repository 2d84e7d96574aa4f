//! Clip extraction pipeline
//!
//! resolve → fetch → transcode, strictly in that order, under one
//! per-request deadline. Both scratch files are owned by [`ScratchFile`]
//! guards: the source is gone once the clip is cut, and the output is
//! removed only after [`ClipOutput`] has been fully streamed or dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::config::ServiceConfig;
use crate::error::{ClipError, Result};
use crate::fetch::{DriveFetcher, MediaFetcher, CHUNK_SIZE};
use crate::scratch::{random_token, ArtifactKind, ScratchDir, ScratchFile};
use crate::source::{parse_source_ref, DriveResolver, SourceResolver};
use crate::timestamp::ClipWindow;
use crate::transcode::{FfmpegTranscoder, Transcoder};

/// A validated clip request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    /// Bare file or folder id.
    pub source_ref: String,
    pub is_container: bool,
    pub window: ClipWindow,
}

impl ClipRequest {
    /// Validate raw client input. Runs before anything touches the network or disk.
    ///
    /// Blank strings count as missing.
    pub fn parse(
        source_ref: Option<&str>,
        is_container: bool,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Self> {
        let source_ref = required(source_ref, "file_id")?;
        let start = required(start, "start_time")?;
        let end = required(end, "end_time")?;

        let window = ClipWindow::parse(start, end)?;
        let source_ref = parse_source_ref(source_ref)?;

        Ok(Self {
            source_ref,
            is_container,
            window,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ClipError::MissingField(field))
}

/// Runs clip requests end to end.
pub struct ClipPipeline {
    resolver: Arc<dyn SourceResolver>,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn Transcoder>,
    scratch: ScratchDir,
    deadline: Duration,
}

impl ClipPipeline {
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn Transcoder>,
        scratch: ScratchDir,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            transcoder,
            scratch,
            deadline: Duration::from_secs(crate::config::DEFAULT_REQUEST_DEADLINE_SECS),
        }
    }

    /// Wall-clock budget for one request, shared by every stage.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Production wiring: the remote file host and ffmpeg.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let resolver = DriveResolver::new(
            config.remote.clone(),
            config.catalog(),
            config.fetch_timeout(),
        );
        let fetcher = DriveFetcher::new(config.remote.clone(), config.fetch_timeout());

        let mut transcoder = FfmpegTranscoder::new().with_timeout(config.transcode_timeout());
        if let Some(path) = &config.ffmpeg_path {
            transcoder = transcoder.with_ffmpeg_path(path.clone());
        }

        Self::new(
            Arc::new(resolver),
            Arc::new(fetcher),
            Arc::new(transcoder),
            config.scratch(),
        )
        .with_deadline(config.request_deadline())
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// Produce the clip for `request`.
    ///
    /// Dropping the returned future at any await point removes every
    /// scratch file allocated so far and kills a running transcoder.
    #[instrument(skip(self, request), fields(source = %request.source_ref, start = request.window.start, end = request.window.end))]
    pub async fn run(&self, request: &ClipRequest) -> Result<ClipOutput> {
        let started = Instant::now();
        let deadline = started + self.deadline;

        let resolved = self.resolver.resolve(request, deadline).await?;

        let source = self.scratch.allocate(ArtifactKind::Source);
        let output = self.scratch.allocate(ArtifactKind::Output);

        let fetched = self
            .fetcher
            .fetch(&resolved.file_ref, source.path(), deadline)
            .await?;
        if !fetched.is_success() {
            let reason = if fetched.bytes_written == 0 {
                "nothing was downloaded"
            } else {
                "host returned an HTML page instead of the video"
            };
            return Err(ClipError::FetchFailed {
                file_id: resolved.file_ref,
                reason: reason.to_string(),
            });
        }

        self.transcoder
            .transcode(
                source.path(),
                request.window.start,
                request.window.duration(),
                output.path(),
                deadline,
            )
            .await?;
        drop(source);

        let size = tokio::fs::metadata(output.path()).await?.len();
        info!(
            bytes = size,
            elapsed_ms = started.elapsed().as_millis(),
            "Clip ready"
        );

        Ok(ClipOutput {
            file: output,
            file_name: format!("clip_{}.mp4", random_token()),
            size,
        })
    }
}

/// A finished clip on disk. The file is removed when this (or its stream) is dropped.
#[derive(Debug)]
pub struct ClipOutput {
    file: ScratchFile,
    file_name: String,
    size: u64,
}

impl ClipOutput {
    /// Suggested download name, `clip_<token>.mp4`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Stream the clip in chunks. The scratch file lives until the stream
    /// reaches its end or is dropped.
    pub async fn into_stream(
        self,
    ) -> Result<impl Stream<Item = std::io::Result<Bytes>> + Send + 'static> {
        let file = tokio::fs::File::open(self.file.path()).await?;

        Ok(futures::stream::unfold(
            Some((file, self.file)),
            |state| async move {
                let (mut file, guard) = state?;
                let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
                match file.read_buf(&mut buf).await {
                    Ok(0) => None,
                    Ok(_) => Some((Ok(buf.freeze()), Some((file, guard)))),
                    Err(e) => Some((Err(e), None)),
                }
            },
        ))
    }

    /// Copy the clip to `dest`, then remove the scratch file.
    pub async fn persist(self, dest: &Path) -> Result<u64> {
        let copied = tokio::fs::copy(self.file.path(), dest).await?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_request() {
        let request =
            ClipRequest::parse(Some("abc"), false, Some("00:01:00"), Some("00:02:00")).unwrap();
        assert_eq!(request.source_ref, "abc");
        assert!(!request.is_container);
        assert_eq!(request.window.start, 60);
        assert_eq!(request.window.duration(), 60);
    }

    #[test]
    fn blank_fields_are_missing() {
        let err = ClipRequest::parse(Some("  "), false, Some("00:00"), Some("00:10")).unwrap_err();
        assert!(matches!(err, ClipError::MissingField("file_id")));

        let err = ClipRequest::parse(Some("abc"), false, None, Some("00:10")).unwrap_err();
        assert!(matches!(err, ClipError::MissingField("start_time")));

        let err = ClipRequest::parse(Some("abc"), false, Some("00:00"), Some("")).unwrap_err();
        assert!(matches!(err, ClipError::MissingField("end_time")));
    }

    #[test]
    fn range_checks_come_before_source_check() {
        let err = ClipRequest::parse(Some("bad ref"), false, Some("00:10"), Some("00:05"))
            .unwrap_err();
        assert!(matches!(err, ClipError::InvalidRange { .. }));

        let err = ClipRequest::parse(Some("bad ref"), false, Some("00:00"), Some("00:10"))
            .unwrap_err();
        assert!(matches!(err, ClipError::InvalidSourceRef(_)));
    }

    #[test]
    fn share_link_is_normalized() {
        let request = ClipRequest::parse(
            Some("https://drive.google.com/drive/folders/1Folder_x"),
            true,
            Some("10:00"),
            Some("11:30"),
        )
        .unwrap();
        assert_eq!(request.source_ref, "1Folder_x");
        assert!(request.is_container);
    }

    #[tokio::test]
    async fn stream_removes_file_after_last_chunk() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::new(dir.path());
        let file = scratch.allocate(ArtifactKind::Output);
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        std::fs::write(file.path(), &data).unwrap();
        let path = file.path().to_path_buf();

        let output = ClipOutput {
            file,
            file_name: "clip_test.mp4".to_string(),
            size: data.len() as u64,
        };
        let mut stream = Box::pin(output.into_stream().await.unwrap());

        let mut received = Vec::new();
        let first = stream.next().await.unwrap().unwrap();
        received.extend_from_slice(&first);
        assert!(path.exists(), "file must outlive partial transmission");

        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(received, data);
        assert!(!path.exists());
    }
}
