//! Persistent retry bookkeeping across unattended runs.
//!
//! Two JSON files back the ledger: an append-only processed set (items
//! that must never be attempted again) and a per-item retry map. Every
//! mutation is a full read-modify-write so a crash between runs can at
//! worst lose the latest increment, never corrupt ordering. A store that
//! fails to parse is backed up with a timestamped suffix and reset to
//! empty instead of aborting the run.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::global;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub timestamp: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryRecord {
    pub count: u32,
    pub first_failure: Option<String>,
    pub last_failure: Option<String>,
    pub last_reason: Option<String>,
    #[serde(default)]
    pub failures: Vec<FailureEvent>,
}

/// Result of recording one failure.
#[derive(Debug, Clone, Copy)]
pub struct FailureOutcome {
    pub count: u32,
    /// The item hit the retry ceiling and joined the processed set.
    /// Callers must raise a high-severity alert on this transition.
    pub abandoned: bool,
}

pub struct RetryLedger {
    processed_file: PathBuf,
    retry_file: PathBuf,
    max_retries: u32,
}

impl RetryLedger {
    pub fn new(processed_file: PathBuf, retry_file: PathBuf, config: &RetryConfig) -> Self {
        Self {
            processed_file,
            retry_file,
            max_retries: config.max_retries,
        }
    }

    /// Ledger over the standard state files in the data directory.
    pub fn open_default(config: &RetryConfig) -> Result<Self> {
        let ledger = Self::new(
            global::processed_entries_file()?,
            global::retry_counts_file()?,
            config,
        );
        if let Some(parent) = ledger.processed_file.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        Ok(ledger)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True when the item must not be attempted again, whether it was
    /// delivered or abandoned.
    pub fn should_skip(&self, key: &str) -> bool {
        self.read_processed().iter().any(|k| k == key)
    }

    pub fn retry_count(&self, key: &str) -> u32 {
        self.read_retries()
            .get(key)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    /// All items currently under retry.
    pub fn pending_retries(&self) -> BTreeMap<String, RetryRecord> {
        self.read_retries()
    }

    /// The processed set, in insertion order.
    pub fn processed_keys(&self) -> Vec<String> {
        self.read_processed()
    }

    /// Record one failed attempt. The count never decreases and stops at
    /// the ceiling; the ceiling transition marks the item processed so
    /// it is not retried again.
    pub fn record_failure(&self, key: &str, reason: &str) -> Result<FailureOutcome> {
        let mut retries = self.read_retries();
        let now = Utc::now().to_rfc3339();

        let record = retries.entry(key.to_string()).or_insert_with(|| RetryRecord {
            first_failure: Some(now.clone()),
            ..Default::default()
        });

        if record.count >= self.max_retries {
            // Already abandoned; keep the count where it stopped.
            return Ok(FailureOutcome {
                count: record.count,
                abandoned: true,
            });
        }

        record.count += 1;
        record.last_failure = Some(now.clone());
        record.last_reason = Some(reason.to_string());
        record.failures.push(FailureEvent {
            timestamp: now,
            reason: reason.to_string(),
        });

        let count = record.count;
        let abandoned = count >= self.max_retries;
        self.write_retries(&retries)?;

        info!(
            "Retry count for {}: {}/{} (reason: {})",
            key, count, self.max_retries, reason
        );

        if abandoned {
            warn!(
                "Max retries ({}) reached for {}, marking processed",
                self.max_retries, key
            );
            self.mark_processed(key)?;
        }

        Ok(FailureOutcome { count, abandoned })
    }

    /// Clear the retry record and mark the item processed after a
    /// confirmed delivery.
    pub fn record_success(&self, key: &str) -> Result<()> {
        let mut retries = self.read_retries();
        if retries.remove(key).is_some() {
            self.write_retries(&retries)?;
            info!("Cleared retry count for {}", key);
        }
        self.mark_processed(key)
    }

    fn mark_processed(&self, key: &str) -> Result<()> {
        let mut processed = self.read_processed();
        if !processed.iter().any(|k| k == key) {
            processed.push(key.to_string());
            self.write_processed(&processed)?;
        }
        Ok(())
    }

    fn read_processed(&self) -> Vec<String> {
        read_json_or_reset(&self.processed_file)
    }

    fn write_processed(&self, processed: &[String]) -> Result<()> {
        write_json(&self.processed_file, processed)
    }

    fn read_retries(&self) -> BTreeMap<String, RetryRecord> {
        read_json_or_reset(&self.retry_file)
    }

    fn write_retries(&self, retries: &BTreeMap<String, RetryRecord>) -> Result<()> {
        write_json(&self.retry_file, retries)
    }
}

/// Read a JSON state file, backing up and resetting on corruption. A
/// missing or empty file is an empty store.
fn read_json_or_reset<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> T {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return T::default(),
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            error!("Error parsing {:?}: {}", path, err);
            backup_corrupt_file(path);
            T::default()
        }
    }
}

fn backup_corrupt_file(path: &Path) {
    let suffix = Utc::now().format("%Y%m%d_%H%M%S");
    let backup = PathBuf::from(format!("{}.backup.{}", path.display(), suffix));
    match std::fs::rename(path, &backup) {
        Ok(()) => info!("Backed up corrupted state file to {:?}", backup),
        Err(err) => error!("Could not back up corrupted state file {:?}: {}", path, err),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize state")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write state file {:?}", path))
}
