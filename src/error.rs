//! Clip pipeline errors
//!
//! Every failure the pipeline can produce is one [`ClipError`] variant.
//! The HTTP layer maps them to a status code and a client-facing message
//! through [`ClipError::status_code`] and [`ClipError::public_message`];
//! nothing else decides how a failure is reported.

use axum::http::StatusCode;
use thiserror::Error;

/// Clip pipeline errors
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("End must be after start ({start}s >= {end}s)")]
    InvalidRange { start: u64, end: u64 },

    #[error("Clip of {requested}s exceeds the {max}s limit")]
    DurationExceeded { requested: u64, max: u64 },

    #[error("Invalid source reference: {0:?}")]
    InvalidSourceRef(String),

    #[error("No .mp4 file found in folder {0}")]
    NoMediaInContainer(String),

    #[error("Remote host unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Download failed for {file_id}: {reason}")]
    FetchFailed { file_id: String, reason: String },

    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("Transcode timed out after {0}s")]
    TranscodeTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClipError>;

impl From<reqwest::Error> for ClipError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: it carries the file id and, after a handshake, the token.
        ClipError::RemoteUnavailable(err.without_url().to_string())
    }
}

impl ClipError {
    /// HTTP status for this error at the service boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClipError::MissingField(_)
            | ClipError::InvalidTimestamp(_)
            | ClipError::InvalidRange { .. }
            | ClipError::DurationExceeded { .. }
            | ClipError::InvalidSourceRef(_) => StatusCode::BAD_REQUEST,
            ClipError::NoMediaInContainer(_) => StatusCode::NOT_FOUND,
            ClipError::RemoteUnavailable(_)
            | ClipError::FetchFailed { .. }
            | ClipError::TranscodeFailed(_)
            | ClipError::TranscodeTimeout(_)
            | ClipError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to a client.
    ///
    /// Validation errors echo their own description. Server-side failures use
    /// fixed wording so transcoder diagnostics and local paths never leave
    /// the process.
    pub fn public_message(&self) -> String {
        match self {
            ClipError::MissingField(_)
            | ClipError::InvalidTimestamp(_)
            | ClipError::InvalidRange { .. }
            | ClipError::DurationExceeded { .. }
            | ClipError::InvalidSourceRef(_)
            | ClipError::NoMediaInContainer(_) => self.to_string(),
            ClipError::RemoteUnavailable(_) => {
                "Could not reach the file host, try again later".to_string()
            }
            ClipError::FetchFailed { .. } => {
                "Could not download the source video (it may be private or rate limited)"
                    .to_string()
            }
            ClipError::TranscodeFailed(_) => "Failed to cut the clip".to_string(),
            ClipError::TranscodeTimeout(secs) => {
                format!("Clip processing took longer than {secs}s, try a shorter clip")
            }
            ClipError::Io(_) => "Internal error while preparing the clip".to_string(),
        }
    }
}
