//! Meeting discovery boundary and the stored-entries diff.
//!
//! The listing scraper and the video/audio fetcher live outside this
//! crate; the pipeline sees them through these traits. What is ours: the
//! stored-entries file used to detect new listings, the processed-set
//! diff, and the test-meeting filter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

mod fetch;

pub use fetch::{CommandFetcher, JsonFileSource};

/// One meeting instance on the source listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingEntry {
    /// Link to the meeting video; the identity key for retry and
    /// processed-set bookkeeping. May be missing on malformed listings.
    #[serde(default)]
    pub source_link: Option<String>,
    pub title: String,
    #[serde(default = "now_rfc3339")]
    pub discovered_at: String,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl ProcessingEntry {
    pub fn new(source_link: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_link: Some(source_link.into()),
            title: title.into(),
            discovered_at: now_rfc3339(),
        }
    }
}

/// Produces the current listing of candidate meetings.
#[async_trait]
pub trait MeetingSource: Send + Sync {
    async fn current_entries(&self) -> Result<Vec<ProcessingEntry>>;
}

/// Downloaded, audio-extracted meeting media ready for the engines.
#[derive(Debug)]
pub struct FetchedAudio {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
}

/// Turns a source link into a local audio file. Download and extraction
/// details (and their cleanup of intermediate video files) stay behind
/// this trait.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_audio(&self, entry: &ProcessingEntry) -> Result<FetchedAudio>;
}

/// Persistent record of listings seen on previous runs.
pub struct EntriesStore {
    path: PathBuf,
}

impl EntriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Vec<ProcessingEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(err) => {
                error!("Error parsing {:?}, starting with empty entries: {err}", self.path);
                Vec::new()
            }
        }
    }

    pub fn write(&self, entries: &[ProcessingEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let content =
            serde_json::to_string_pretty(entries).context("Failed to serialize entries")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {:?}", self.path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Entries not seen on a previous run and not already processed.
pub fn new_entries<'a>(
    current: &'a [ProcessingEntry],
    stored: &[ProcessingEntry],
    is_processed: impl Fn(&str) -> bool,
) -> Vec<&'a ProcessingEntry> {
    current
        .iter()
        .filter(|entry| !stored.iter().any(|s| s.title == entry.title))
        .filter(|entry| {
            entry
                .source_link
                .as_deref()
                .map_or(true, |link| !is_processed(link))
        })
        .collect()
}

/// Listings announced as test meetings are never processed.
pub fn is_test_meeting(title: &str) -> bool {
    title.to_lowercase().contains("test meeting")
}

/// Drop test meetings, logging how many were skipped.
pub fn filter_test_meetings<'a>(entries: Vec<&'a ProcessingEntry>) -> Vec<&'a ProcessingEntry> {
    let before = entries.len();
    let filtered: Vec<_> = entries
        .into_iter()
        .filter(|e| !is_test_meeting(&e.title))
        .collect();
    let skipped = before - filtered.len();
    if skipped > 0 {
        info!("Skipped {skipped} test meeting(s)");
    }
    filtered
}
