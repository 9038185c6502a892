//! Boundary adapters for the external scraper and media fetcher.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use super::{FetchedAudio, MediaFetcher, MeetingSource, ProcessingEntry};

/// Reads the listing file the external scraper maintains.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MeetingSource for JsonFileSource {
    async fn current_entries(&self) -> Result<Vec<ProcessingEntry>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read listing file {:?}", self.path))?;
        let entries: Vec<ProcessingEntry> =
            serde_json::from_str(&content).context("Failed to parse listing file")?;
        debug!("Listing file has {} entries", entries.len());
        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
struct FetchOutput {
    audio_path: PathBuf,
    duration_seconds: f64,
}

/// Invokes the configured download/extract command for one entry. The
/// command owns proxying of the actual media download and cleanup of
/// intermediate video files; it reports the audio it produced as JSON on
/// stdout.
pub struct CommandFetcher {
    command: String,
    scratch_dir: PathBuf,
}

impl CommandFetcher {
    pub fn new(command: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            scratch_dir: scratch_dir.into(),
        }
    }
}

#[async_trait]
impl MediaFetcher for CommandFetcher {
    async fn fetch_audio(&self, entry: &ProcessingEntry) -> Result<FetchedAudio> {
        let link = entry
            .source_link
            .as_deref()
            .context("Entry has no source link")?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .context("Failed to create scratch directory")?;

        info!("Fetching media for {}", link);

        let output = Command::new(&self.command)
            .arg(link)
            .arg(&self.scratch_dir)
            .output()
            .await
            .with_context(|| format!("Failed to run fetch command {:?}", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Fetch command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let parsed: FetchOutput = serde_json::from_slice(&output.stdout)
            .context("Fetch command printed unexpected output")?;

        if !parsed.audio_path.exists() {
            bail!("Fetch command reported missing audio file {:?}", parsed.audio_path);
        }

        Ok(FetchedAudio {
            audio_path: parsed.audio_path,
            duration_seconds: parsed.duration_seconds,
        })
    }
}
