//! Source resolution
//!
//! Turns the reference a client sends into the id of one downloadable file.
//! A plain file reference passes through; a folder reference costs one GET
//! of the folder page, searched with the [`listing`] strategies.

pub mod listing;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

use crate::catalog::Catalog;
use crate::config::RemoteEndpoints;
use crate::error::{ClipError, Result};
use crate::http_client::HostClient;
use crate::pipeline::ClipRequest;

pub use listing::{find_media_file, ListingMatch, MEDIA_EXTENSION};

/// A concrete downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub file_ref: String,
}

/// Trait for turning a clip request into a downloadable file id.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Resolve the request's source, finishing before `deadline`.
    async fn resolve(&self, request: &ClipRequest, deadline: Instant) -> Result<ResolvedMedia>;
}

/// Normalize a source reference to a bare file or folder id.
///
/// Accepts a bare id or a share link:
/// - `https://host/file/d/<id>/view`
/// - `https://host/drive/folders/<id>?usp=sharing`
/// - `https://host/open?id=<id>`
pub fn parse_source_ref(reference: &str) -> Result<String> {
    let reference = reference.trim();
    let invalid = || ClipError::InvalidSourceRef(reference.to_string());

    let id = if reference.starts_with("http://") || reference.starts_with("https://") {
        let url = Url::parse(reference).map_err(|_| invalid())?;
        id_from_url(&url).ok_or_else(invalid)?
    } else {
        reference.to_string()
    };

    if is_valid_id(&id) {
        Ok(id)
    } else {
        Err(invalid())
    }
}

fn id_from_url(url: &Url) -> Option<String> {
    if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "id") {
        return Some(id.into_owned());
    }

    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == "d" || pair[0] == "folders")
        .map(|pair| pair[1].to_string())
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Resolver backed by the remote file host's folder pages.
pub struct DriveResolver {
    endpoints: RemoteEndpoints,
    catalog: Catalog,
    timeout: Duration,
}

impl DriveResolver {
    #[must_use]
    pub fn new(endpoints: RemoteEndpoints, catalog: Catalog, timeout: Duration) -> Self {
        Self {
            endpoints,
            catalog,
            timeout,
        }
    }

    /// A reference is a folder if the request says so or the catalog lists it as one.
    fn is_folder(&self, request: &ClipRequest) -> bool {
        request.is_container
            || self
                .catalog
                .get(&request.source_ref)
                .is_some_and(|entry| entry.is_folder)
    }

    fn folder_url(&self, folder_id: &str) -> String {
        format!(
            "{}/{}",
            self.endpoints.folder_url.trim_end_matches('/'),
            urlencoding::encode(folder_id)
        )
    }

    async fn search_folder(&self, folder_id: &str) -> Result<ResolvedMedia> {
        let client = HostClient::new(self.timeout)?;
        let response = client.fetch(&self.folder_url(folder_id)).await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ClipError::RemoteUnavailable(format!(
                "folder listing returned {status}"
            )));
        }
        let html = client.read_text(response).await?;
        debug!(bytes = html.len(), "Folder listing downloaded");

        match find_media_file(&html) {
            Some((found, strategy)) => {
                info!(
                    folder = folder_id,
                    file = %found.file_id,
                    name = %found.name,
                    strategy,
                    "Found media file in folder"
                );
                Ok(ResolvedMedia {
                    file_ref: found.file_id,
                })
            }
            None => Err(ClipError::NoMediaInContainer(folder_id.to_string())),
        }
    }
}

#[async_trait]
impl SourceResolver for DriveResolver {
    #[instrument(skip(self, request, deadline), fields(source = %request.source_ref))]
    async fn resolve(&self, request: &ClipRequest, deadline: Instant) -> Result<ResolvedMedia> {
        if !self.is_folder(request) {
            return Ok(ResolvedMedia {
                file_ref: request.source_ref.clone(),
            });
        }

        tokio::time::timeout_at(deadline, self.search_folder(&request.source_ref))
            .await
            .map_err(|_| {
                ClipError::RemoteUnavailable("deadline exceeded while listing folder".to_string())
            })?
    }
}
