//! HTTP object-store destination (Seafile-compatible API).
//!
//! Uploads go through a two-step flow: request an upload link for the
//! parent directory, then POST the file to it as multipart form data.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::destination::Destination;
use crate::config::DestinationConfig;

const MAX_ATTEMPTS: u32 = 3;

pub struct ObjectStoreDestination {
    client: reqwest::Client,
    base_url: String,
    token: String,
    library_id: String,
    /// Base folder all remote paths are rooted under.
    root: String,
}

impl ObjectStoreDestination {
    pub fn from_config(config: &DestinationConfig, client: reqwest::Client) -> Result<Self> {
        let base_url = config
            .url
            .clone()
            .context("object-store destination requires a url")?;
        let token = config
            .token
            .clone()
            .context("object-store destination requires a token")?;
        let library_id = config
            .library_id
            .clone()
            .context("object-store destination requires a library_id")?;

        info!("Initialized object store client for {}", base_url);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            library_id,
            root: config.root.trim_matches('/').to_string(),
        })
    }

    fn absolute(&self, remote: &str) -> String {
        let remote = remote.trim_start_matches('/');
        if self.root.is_empty() {
            format!("/{remote}")
        } else {
            format!("/{}/{}", self.root, remote)
        }
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn upload_link(&self, parent_dir: &str) -> Result<String> {
        let url = format!(
            "{}/api2/repos/{}/upload-link/",
            self.base_url, self.library_id
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(&[("p", parent_dir)])
            .send()
            .await
            .context("Failed to request upload link")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read upload link")?;
        if !status.is_success() {
            bail!("Upload link request failed with {status}: {body}");
        }

        Ok(body.trim().trim_matches('"').to_string())
    }

    async fn try_upload(&self, local: &Path, parent_dir: &str, filename: &str) -> Result<()> {
        let upload_url = self.upload_link(parent_dir).await?;

        let bytes = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read artifact {:?}", local))?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("text/plain")?;
        let form = reqwest::multipart::Form::new()
            .text("parent_dir", parent_dir.to_string())
            .text("replace", "1")
            .part("file", part);

        let response = self
            .client
            .post(&upload_url)
            .header("Authorization", self.auth_header())
            .multipart(form)
            .send()
            .await
            .context("Upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Upload failed with {status}: {body}");
        }

        Ok(())
    }
}

#[async_trait]
impl Destination for ObjectStoreDestination {
    fn name(&self) -> String {
        format!("store:{}", self.base_url)
    }

    async fn ensure_dir(&self, path: &str) -> Result<()> {
        let absolute = self.absolute(path);

        // Create each level; an already-existing directory is reported
        // as a client error by the API and is fine.
        let mut current = String::new();
        for part in absolute.trim_matches('/').split('/') {
            current.push('/');
            current.push_str(part);

            let url = format!("{}/api2/repos/{}/dir/", self.base_url, self.library_id);
            let response = self
                .client
                .post(&url)
                .header("Authorization", self.auth_header())
                .query(&[("p", current.as_str())])
                .form(&[("operation", "mkdir")])
                .send()
                .await
                .context("mkdir request failed")?;

            let status = response.status();
            if status.is_server_error() {
                bail!("mkdir {current} failed with {status}");
            }
            debug!("mkdir {} -> {}", current, status);
        }

        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<()> {
        let absolute = self.absolute(remote);
        let (parent_dir, filename) = match absolute.rsplit_once('/') {
            Some((dir, file)) if !dir.is_empty() => (dir.to_string(), file.to_string()),
            _ => ("/".to_string(), absolute.trim_start_matches('/').to_string()),
        };

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = backoff_with_jitter(attempt);
                warn!(
                    "Retrying upload of {} in {:?} (attempt {}/{})",
                    filename,
                    backoff,
                    attempt + 1,
                    MAX_ATTEMPTS
                );
                sleep(backoff).await;
            }

            match self.try_upload(local, &parent_dir, &filename).await {
                Ok(()) => {
                    info!("Uploaded {} to {}", filename, parent_dir);
                    return Ok(());
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Upload failed")))
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = Duration::from_millis(500 * 2u64.pow(attempt.min(6)));
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObjectStoreDestination {
        ObjectStoreDestination::from_config(
            &DestinationConfig {
                kind: "object-store".to_string(),
                url: Some("https://store.example.test/".to_string()),
                token: Some("t0ken".to_string()),
                library_id: Some("lib-1".to_string()),
                root: "Legislative Transcription".to_string(),
            },
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn remote_paths_are_rooted_under_base_folder() {
        let store = store();
        assert_eq!(
            store.absolute("Interim/LFC/2026-01-12/captions/x.json"),
            "/Legislative Transcription/Interim/LFC/2026-01-12/captions/x.json"
        );
        assert_eq!(store.absolute("/flat.json"), "/Legislative Transcription/flat.json");
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let result = ObjectStoreDestination::from_config(
            &DestinationConfig {
                kind: "object-store".to_string(),
                ..Default::default()
            },
            reqwest::Client::new(),
        );
        assert!(result.is_err());
    }
}
