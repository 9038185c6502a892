//! Outbound notifications: push alerts and the manifest webhook.
//!
//! Both are fire-and-forget: a failed notification is logged and never
//! affects pipeline state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::NotifyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPriority {
    /// Routine progress, e.g. a successful delivery.
    Normal,
    /// A failed attempt that will be retried automatically.
    Low,
    /// Terminal failures needing manual attention.
    High,
}

impl AlertPriority {
    fn as_push_value(&self) -> i8 {
        match self {
            AlertPriority::Low => -1,
            AlertPriority::Normal => 0,
            AlertPriority::High => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub priority: AlertPriority,
}

impl Alert {
    pub fn success(committee: &str, date: &str, time: &str, duration_secs: f64, filename: &str) -> Self {
        Self {
            title: format!("Processed: {committee}"),
            message: format!(
                "{committee} on {date} ({time}) delivered as {filename} in {duration_secs:.1}s"
            ),
            priority: AlertPriority::Normal,
        }
    }

    pub fn retry_pending(
        committee: &str,
        date: &str,
        time: &str,
        reason: &str,
        attempt: u32,
        max_retries: u32,
    ) -> Self {
        Self {
            title: format!("Retrying: {committee}"),
            message: format!(
                "{committee} on {date} ({time}) failed: {reason}. Attempt {attempt}/{max_retries} - will retry automatically"
            ),
            priority: AlertPriority::Low,
        }
    }

    pub fn abandoned(committee: &str, date: &str, time: &str, reason: &str, max_retries: u32) -> Self {
        Self {
            title: format!("MAX RETRIES: {committee}"),
            message: format!(
                "{committee} on {date} ({time}) failed after {max_retries} attempts. Last error: {reason}. Requires manual attention."
            ),
            priority: AlertPriority::High,
        }
    }

    pub fn validation(committee: &str, date: &str, time: &str, reason: &str) -> Self {
        Self {
            title: format!("Validation: {committee}"),
            message: format!("{committee} on {date} ({time}): {reason} - cannot retry"),
            priority: AlertPriority::High,
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<()>;
}

/// Pushover-style form POST sink.
pub struct PushSink {
    client: reqwest::Client,
    url: String,
    token: String,
    user: String,
}

impl PushSink {
    pub fn from_config(config: &NotifyConfig, client: reqwest::Client) -> Option<Self> {
        let url = config.push_url.clone()?;
        let token = config.push_token.clone()?;
        let user = config.push_user.clone()?;
        Some(Self {
            client,
            url,
            token,
            user,
        })
    }
}

#[async_trait]
impl AlertSink for PushSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        let priority = alert.priority.as_push_value().to_string();
        let params = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("title", alert.title.as_str()),
            ("message", alert.message.as_str()),
            ("priority", priority.as_str()),
        ];

        let response = self
            .client
            .post(&self.url)
            .form(&params)
            .send()
            .await
            .context("Push notification request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Push service returned status {}", response.status());
        }

        Ok(())
    }
}

/// Fire-and-forget wrapper over an optional sink.
pub struct AlertService {
    sink: Option<Box<dyn AlertSink>>,
}

impl AlertService {
    pub fn new(sink: Option<Box<dyn AlertSink>>) -> Self {
        Self { sink }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub async fn send(&self, alert: Alert) {
        let Some(sink) = &self.sink else {
            info!("Alert (no sink configured): {} - {}", alert.title, alert.message);
            return;
        };

        if let Err(err) = sink.send(&alert).await {
            warn!("Failed to send alert '{}': {}", alert.title, err);
        }
    }
}

/// Payload announcing a freshly archived manifest to downstream
/// consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestAnnouncement {
    pub committee: String,
    pub date: String,
    pub manifest_path: String,
    pub store_url: Option<String>,
    pub store_library_id: Option<String>,
    pub source: String,
}

#[async_trait]
pub trait ManifestWebhook: Send + Sync {
    async fn announce(&self, announcement: &ManifestAnnouncement) -> Result<()>;
}

/// JSON POST webhook sender.
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
}

impl HttpWebhook {
    pub fn from_config(config: &NotifyConfig, client: reqwest::Client) -> Option<Self> {
        let url = config.webhook_url.clone()?;
        Some(Self {
            client,
            url,
            timeout: std::time::Duration::from_secs(config.webhook_timeout_seconds),
        })
    }
}

#[async_trait]
impl ManifestWebhook for HttpWebhook {
    async fn announce(&self, announcement: &ManifestAnnouncement) -> Result<()> {
        let payload = json!({
            "committee": announcement.committee,
            "date": announcement.date,
            "manifest_path": announcement.manifest_path,
            "store_url": announcement.store_url,
            "store_library_id": announcement.store_library_id,
            "source": announcement.source,
            "sent_at": Utc::now().to_rfc3339(),
        });

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .context("Webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Webhook returned status {status}");
        }

        info!("Manifest webhook acknowledged with {}", status);
        Ok(())
    }
}
