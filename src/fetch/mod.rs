//! Source video download
//!
//! [`DriveFetcher`] pulls a file from the remote host into a scratch path,
//! working through the confirmation [`handshake`] and sniffing the result
//! with [`validate`] so an error page is never mistaken for video.

pub mod handshake;
pub mod validate;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Response;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::{append_query, RemoteEndpoints};
use crate::error::{ClipError, Result};
use crate::http_client::HostClient;

use handshake::{is_html, token_from_body, token_from_cookies, Endpoint, Handshake, Signal, Step};

/// Write buffer size for streamed downloads.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Outcome of a download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchResult {
    pub bytes_written: u64,
    pub looks_like_error_page: bool,
}

impl FetchResult {
    /// Nothing usable was written.
    pub fn failed() -> Self {
        Self {
            bytes_written: 0,
            looks_like_error_page: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.bytes_written > 0 && !self.looks_like_error_page
    }
}

/// Trait for downloading a source file to local disk.
///
/// HTTP-level refusals come back as an unsuccessful [`FetchResult`]. Errors
/// are reserved for an unreachable host ([`ClipError::RemoteUnavailable`])
/// and local I/O failures.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, file_id: &str, dest: &Path, deadline: Instant) -> Result<FetchResult>;
}

/// Fetcher for the Drive-style export endpoints.
pub struct DriveFetcher {
    endpoints: RemoteEndpoints,
    idle_timeout: Duration,
}

impl DriveFetcher {
    #[must_use]
    pub fn new(endpoints: RemoteEndpoints, idle_timeout: Duration) -> Self {
        Self {
            endpoints,
            idle_timeout,
        }
    }

    fn url_for(&self, endpoint: Endpoint, file_id: &str, token: Option<&str>) -> String {
        let base = match endpoint {
            Endpoint::Primary => &self.endpoints.download_url,
            Endpoint::Alternate => &self.endpoints.usercontent_url,
        };
        match token {
            Some(token) => append_query(base, &[("id", file_id), ("confirm", token)]),
            None => append_query(base, &[("id", file_id)]),
        }
    }

    /// Classify a response. Only HTML bodies are read; a payload is left untouched.
    ///
    /// A non-HTML body is the file, whatever cookies came with it. The
    /// warning cookie only counts on the first response: the jar keeps
    /// replaying it afterwards.
    async fn inspect(
        client: &HostClient,
        response: Response,
        state: &Handshake,
    ) -> Result<(Signal, Option<Response>)> {
        if !is_html(response.headers()) {
            return Ok((Signal::Payload, Some(response)));
        }

        if *state == Handshake::Initial {
            let cookie_token = token_from_cookies(
                response
                    .cookies()
                    .map(|c| (c.name().to_string(), c.value().to_string())),
            );
            if let Some(token) = cookie_token {
                debug!("Confirmation cookie present");
                return Ok((Signal::CookieToken(token), None));
            }
        }

        let body = client.read_text(response).await?;
        match token_from_body(&body) {
            Some(token) => {
                debug!("Confirmation token found in interstitial");
                Ok((Signal::BodyToken(token), None))
            }
            None => Ok((Signal::Html, None)),
        }
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<FetchResult> {
        let client = HostClient::new(self.idle_timeout)?;
        let mut state = Handshake::Initial;
        let mut step = Handshake::first_step();

        loop {
            let Step::Request { endpoint, token } = step else {
                warn!(file = file_id, "Host kept serving HTML, giving up");
                return Ok(FetchResult::failed());
            };

            let url = self.url_for(endpoint, file_id, token.as_deref());
            let response = client.fetch(&url).await?;
            if !response.status().is_success() {
                warn!(
                    file = file_id,
                    status = %response.status(),
                    ?endpoint,
                    "Download refused"
                );
                return Ok(FetchResult::failed());
            }

            let (signal, payload) = Self::inspect(&client, response, &state).await?;
            let (next_state, next_step) = state.advance(&signal);
            debug!(?signal, state = ?next_state, "Handshake advanced");
            state = next_state;

            if let (Step::Download, Some(response)) = (&next_step, payload) {
                let written = write_body(&client, response, dest).await?;
                return finish(dest, written).await;
            }
            step = next_step;
        }
    }
}

#[async_trait]
impl MediaFetcher for DriveFetcher {
    #[instrument(skip(self, dest, deadline))]
    async fn fetch(&self, file_id: &str, dest: &Path, deadline: Instant) -> Result<FetchResult> {
        tokio::time::timeout_at(deadline, self.download(file_id, dest))
            .await
            .map_err(|_| {
                ClipError::RemoteUnavailable("deadline exceeded while downloading".to_string())
            })?
    }
}

/// Stream a response body to `dest`, skipping empty chunks.
async fn write_body(client: &HostClient, response: Response, dest: &Path) -> Result<u64> {
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = tokio::time::timeout(client.idle_timeout(), stream.next())
        .await
        .map_err(|_| client.stalled())?
    {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

/// Check what landed on disk.
async fn finish(dest: &Path, streamed: u64) -> Result<FetchResult> {
    let size = match tokio::fs::metadata(dest).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FetchResult::failed()),
        Err(e) => return Err(e.into()),
    };
    debug!(streamed, size, "Download finished");

    let looks_like_error_page = size == 0 || validate::looks_like_error_page(dest, size).await?;
    if looks_like_error_page {
        warn!(bytes = size, "Downloaded file is not media");
    } else {
        info!(bytes = size, "Source downloaded");
    }

    Ok(FetchResult {
        bytes_written: size,
        looks_like_error_page,
    })
}
