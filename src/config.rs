//! Service configuration loaded from `~/.config/clipd/config.toml`.
//!
//! Every key is optional; a missing file yields the defaults below. The
//! episode catalog lives in the same file as `[[episodes]]` tables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::catalog::{Catalog, EpisodeEntry};
use crate::scratch::ScratchDir;

/// Default listen address, matching the port the service has always used.
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 600;

/// Endpoints of the remote file host.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteEndpoints {
    /// Primary export download, `id` and `confirm` are appended as query params.
    pub download_url: String,
    /// Alternate download host tried once when the primary keeps serving HTML.
    pub usercontent_url: String,
    /// Folder listing page, the folder id is appended as a path segment.
    pub folder_url: String,
    /// Thumbnail preview, `id` is appended as a query param.
    pub thumbnail_url: String,
}

impl Default for RemoteEndpoints {
    fn default() -> Self {
        Self {
            download_url: "https://drive.google.com/uc?export=download".to_string(),
            usercontent_url: "https://drive.usercontent.google.com/download?export=download"
                .to_string(),
            folder_url: "https://drive.google.com/drive/folders".to_string(),
            thumbnail_url: "https://drive.google.com/thumbnail?sz=w320".to_string(),
        }
    }
}

impl RemoteEndpoints {
    /// Point every endpoint at one base URL (used against local test hosts).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            download_url: format!("{base}/uc?export=download"),
            usercontent_url: format!("{base}/download?export=download"),
            folder_url: format!("{base}/drive/folders"),
            thumbnail_url: format!("{base}/thumbnail?sz=w320"),
        }
    }

    pub fn thumbnail_for(&self, file_id: &str) -> String {
        append_query(&self.thumbnail_url, &[("id", file_id)])
    }
}

/// Append `key=value` pairs to a URL that may or may not already carry a query.
pub(crate) fn append_query(base: &str, params: &[(&str, &str)]) -> String {
    let mut url = base.to_string();
    for (key, value) in params {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: String,
    /// Scratch directory for downloads and clips. Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// ffmpeg binary. Defaults to the one found in `PATH`.
    pub ffmpeg_path: Option<PathBuf>,
    pub transcode_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub request_deadline_secs: u64,
    pub remote: RemoteEndpoints,
    pub episodes: Vec<EpisodeEntry>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            scratch_dir: None,
            ffmpeg_path: None,
            transcode_timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            request_deadline_secs: DEFAULT_REQUEST_DEADLINE_SECS,
            remote: RemoteEndpoints::default(),
            episodes: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load from an explicit path, or from the default location.
    ///
    /// An explicit path must exist. The default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply the `PORT` environment override, keeping the configured host.
    #[must_use]
    pub fn with_port_override(mut self, port: Option<&str>) -> Self {
        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            let host = self
                .bind
                .rsplit_once(':')
                .map_or(self.bind.as_str(), |(host, _)| host)
                .to_string();
            self.bind = format!("{host}:{port}");
        }
        self
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }

    pub fn scratch(&self) -> ScratchDir {
        self.scratch_dir
            .as_ref()
            .map_or_else(ScratchDir::system, |dir| ScratchDir::new(dir.clone()))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.episodes.clone())
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}

/// Return the path to the default config file.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipd")
        .join("config.toml")
}
