//! Episode catalog
//!
//! A fixed, ordered list of episodes loaded once at startup (from the
//! `[[episodes]]` tables of the service config) and shared read-only.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `Episode 12`, `Ep. 12`, `EP12`, `#12`
static EPISODE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bepisode\b|\bep\b\.?|\bep|#)\s*(\d+)").expect("valid episode regex")
});

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EpisodeEntry {
    pub title: String,
    /// File id, or folder id when `is_folder` is set.
    #[serde(alias = "file_id", alias = "id")]
    pub source_ref: String,
    #[serde(default, alias = "is_container")]
    pub is_folder: bool,
}

impl EpisodeEntry {
    pub fn new(title: impl Into<String>, source_ref: impl Into<String>, is_folder: bool) -> Self {
        Self {
            title: title.into(),
            source_ref: source_ref.into(),
            is_folder,
        }
    }
}

/// Episode as shown by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub id: String,
    pub title: String,
    pub episode_number: u32,
    pub is_folder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Read-only, cheaply clonable episode catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<[EpisodeEntry]>,
}

impl Catalog {
    pub fn new(entries: Vec<EpisodeEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    pub fn entries(&self) -> &[EpisodeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find an entry by its source reference.
    pub fn get(&self, source_ref: &str) -> Option<&EpisodeEntry> {
        self.entries.iter().find(|e| e.source_ref == source_ref)
    }

    /// Entries in catalog order with derived episode numbers.
    ///
    /// `thumbnail` builds a preview URL for plain files; folders get none.
    pub fn summaries(&self, thumbnail: impl Fn(&str) -> String) -> Vec<EpisodeSummary> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| EpisodeSummary {
                id: entry.source_ref.clone(),
                title: entry.title.clone(),
                episode_number: episode_number(&entry.title, i),
                is_folder: entry.is_folder,
                thumbnail: (!entry.is_folder).then(|| thumbnail(&entry.source_ref)),
            })
            .collect()
    }
}

/// Episode number from the title, or the 1-based catalog position.
pub fn episode_number(title: &str, position: usize) -> u32 {
    EPISODE_NUMBER
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX))
}
