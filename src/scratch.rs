//! Per-request scratch files
//!
//! Every intermediate file lives in the shared scratch directory under a
//! random name and is owned by a [`ScratchFile`]. Dropping the guard removes
//! the file, so cleanup happens on every exit path: success, early `?`
//! returns, panics, and cancelled futures alike.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// What a scratch file holds. Decides the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Downloaded source video.
    Source,
    /// Transcoded clip sent back to the client.
    Output,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::Source => "clip_src_",
            ArtifactKind::Output => "clip_out_",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Source => write!(f, "source"),
            ArtifactKind::Output => write!(f, "output"),
        }
    }
}

/// Short random token used in scratch names and download file names.
pub fn random_token() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Allocates scratch paths inside one directory.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch directory in the platform temp dir.
    #[must_use]
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a fresh path. Nothing is created on disk until a writer opens it.
    pub fn allocate(&self, kind: ArtifactKind) -> ScratchFile {
        let path = self
            .root
            .join(format!("{}{}.mp4", kind.prefix(), random_token()));
        debug!(kind = %kind, path = %path.display(), "Allocated scratch file");
        ScratchFile { path, kind }
    }
}

impl Default for ScratchDir {
    fn default() -> Self {
        Self::system()
    }
}

/// Owns one scratch path; removes it on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    kind: ArtifactKind,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        // Best effort: the file may never have been created, and a failed
        // removal must not replace the request's own outcome.
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(kind = %self.kind, path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                kind = %self.kind,
                path = %self.path.display(),
                error = %e,
                "Could not remove scratch file"
            ),
        }
    }
}
