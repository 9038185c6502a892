//! Upload destination boundary.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DestinationConfig;

/// A storage backend files can be uploaded to. Transport details stay
/// behind this trait; the coordinator only needs these two operations.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> String;

    async fn ensure_dir(&self, path: &str) -> Result<()>;

    /// Upload one local file to `remote` (a path relative to the
    /// destination root).
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()>;
}

/// Filesystem destination: a mounted share or a local drop directory.
/// Also the backend the integration tests run against.
pub struct LocalDirDestination {
    root: PathBuf,
}

impl LocalDirDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &DestinationConfig) -> Result<Self> {
        if config.root.is_empty() {
            bail!("local-dir destination requires a root directory");
        }
        Ok(Self::new(&config.root))
    }

    fn resolve(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }
}

#[async_trait]
impl Destination for LocalDirDestination {
    fn name(&self) -> String {
        format!("dir:{}", self.root.display())
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        tokio::fs::create_dir_all(&full)
            .await
            .with_context(|| format!("Failed to create directory {:?}", full))?;
        debug!("Ensured directory {:?}", full);
        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let full = self.resolve(remote);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        tokio::fs::copy(local, &full)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", local, full))?;
        info!("Stored {:?}", full);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upload_creates_parents_and_copies() {
        let dir = tempdir().unwrap();
        let destination = LocalDirDestination::new(dir.path());

        let local = dir.path().join("artifact.txt");
        std::fs::write(&local, "content").unwrap();

        destination
            .upload_file(&local, "Interim/LFC/2026-01-12/captions/artifact.txt")
            .await
            .unwrap();

        let stored = dir
            .path()
            .join("Interim/LFC/2026-01-12/captions/artifact.txt");
        assert_eq!(std::fs::read_to_string(stored).unwrap(), "content");
    }

    #[test]
    fn empty_root_is_rejected() {
        let config = DestinationConfig::default();
        assert!(LocalDirDestination::from_config(&config).is_err());
    }
}
