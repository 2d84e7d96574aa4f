//! HTTP client for the remote file host
//!
//! Features:
//! - Cookie store, so confirmation cookies set by the host are replayed
//! - Rustls TLS, gzip/deflate for listing pages
//! - Connect and idle timeouts, so a stalled host cannot pin a request
//!
//! One [`HostClient`] is built per clip request: the cookie jar then only
//! ever holds that request's handshake state.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, info, instrument};

use crate::error::{ClipError, Result};

/// Desktop browser user agent. The host serves simplified markup to unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// HTTP client scoped to one request's conversation with the host.
#[derive(Debug, Clone)]
pub struct HostClient {
    client: Client,
    idle_timeout: Duration,
}

impl HostClient {
    /// Create a client that gives up when the host stays silent for `idle_timeout`.
    ///
    /// The bound applies to waiting for response headers and, through
    /// [`HostClient::idle_timeout`], to each body chunk. A whole transfer may
    /// take longer as long as bytes keep arriving.
    pub fn new(idle_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .use_rustls_tls()
            .gzip(true)
            .deflate(true)
            .tcp_nodelay(true)
            // ═══════════════════════════════════════════════════════════════
            // TIMEOUTS
            // ═══════════════════════════════════════════════════════════════
            .connect_timeout(Duration::from_secs(10).min(idle_timeout))
            // ═══════════════════════════════════════════════════════════════
            // REDIRECTS
            // ═══════════════════════════════════════════════════════════════
            // The export endpoint bounces through a couple of hosts.
            .redirect(reqwest::redirect::Policy::limited(10))
            // ═══════════════════════════════════════════════════════════════
            // COOKIES
            // ═══════════════════════════════════════════════════════════════
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            idle_timeout,
        })
    }

    /// GET a URL, returning the response with its body still unread.
    #[instrument(skip(self, url))]
    pub async fn fetch(&self, url: &str) -> Result<Response> {
        debug!("Requesting remote resource");
        let response = tokio::time::timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| self.stalled())??;

        info!(
            status = %response.status(),
            version = ?response.version(),
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            content_length = ?response.content_length(),
            "Response received"
        );

        Ok(response)
    }

    /// Read a response body as text, bounded by the idle timeout.
    pub async fn read_text(&self, response: Response) -> Result<String> {
        let text = tokio::time::timeout(self.idle_timeout, response.text())
            .await
            .map_err(|_| self.stalled())??;
        Ok(text)
    }

    /// How long the host may stay silent before a transfer is abandoned.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Error reported when the host stops answering.
    pub fn stalled(&self) -> ClipError {
        ClipError::RemoteUnavailable(format!(
            "no response from host for {}s",
            self.idle_timeout.as_secs()
        ))
    }
}
