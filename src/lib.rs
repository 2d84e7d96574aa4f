//! `clipd` - Episode clip extraction service
//!
//! # Features
//!
//! - **Source resolution**: file ids, share links, and folder listings
//! - **Robust download**: confirmation-token handshake with an alternate host fallback
//! - **Transcoding**: ffmpeg subprocess under a hard timeout
//! - **Cleanup**: scratch files removed on every exit path, including cancellation
//!
//! # Example
//!
//! ```rust,no_run
//! use clipd::{ClipPipeline, ClipRequest, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::load(None)?;
//!     let pipeline = ClipPipeline::from_config(&config);
//!     let request = ClipRequest::parse(Some("1AbCdEf"), false, Some("01:00"), Some("01:30"))?;
//!     let clip = pipeline.run(&request).await?;
//!     clip.persist(std::path::Path::new("clip.mp4")).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod pipeline;
pub mod scratch;
pub mod server;
pub mod source;
pub mod timestamp;
pub mod transcode;

pub use catalog::{Catalog, EpisodeEntry, EpisodeSummary};
pub use config::{RemoteEndpoints, ServiceConfig};
pub use error::{ClipError, Result};
pub use fetch::{DriveFetcher, FetchResult, MediaFetcher};
pub use pipeline::{ClipOutput, ClipPipeline, ClipRequest};
pub use scratch::{ArtifactKind, ScratchDir, ScratchFile};
pub use source::{parse_source_ref, DriveResolver, ResolvedMedia, SourceResolver};
pub use timestamp::{format_timestamp, parse_timestamp, ClipWindow, MAX_CLIP_DURATION};
pub use transcode::{FfmpegTranscoder, Transcoder};

/// Version of clipd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
