use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub engines: EnginesConfig,
    pub alignment: AlignmentConfig,
    pub turns: TurnsConfig,
    pub retry: RetryConfig,
    pub archive: DestinationConfig,
    pub delivery: DestinationConfig,
    pub notify: NotifyConfig,
    pub egress: EgressConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// JSON listing file maintained by the external scraper.
    pub listing_file: Option<String>,
    /// Command that downloads a meeting video and extracts audio; it
    /// receives the source link and a scratch directory and prints a
    /// JSON `{audio_path, duration_seconds}` object.
    pub fetch_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// Primary transcription engine ("remote" or "command").
    pub transcriber: String,
    /// Engine tried when the primary fails, if any.
    pub fallback: Option<String>,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub command_path: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    /// Diarization engine endpoint; unset disables diarization.
    pub diarization_endpoint: Option<String>,
    pub chunk: ChunkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Recordings longer than this are split into windows before transcription.
    pub window_seconds: f64,
    pub overlap_seconds: f64,
    /// Bounded worker pool size for chunk transcription.
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Segments below this word count are folded into a neighbor.
    pub min_words: usize,
    /// Time-lookup strategy: max distance to the nearest diarized boundary.
    pub gap_tolerance_seconds: f64,
    pub default_speaker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnsConfig {
    pub major_pause_seconds: f64,
    pub moderate_pause_seconds: f64,
    pub minor_pause_seconds: f64,
    /// Turns below this word count are merged into the previous turn.
    pub min_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// "object-store" for the HTTP store client, "local-dir" for a
    /// filesystem drop directory.
    pub kind: String,
    pub url: Option<String>,
    pub token: Option<String>,
    pub library_id: Option<String>,
    /// Base folder (object store) or directory path (local-dir).
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub push_url: Option<String>,
    pub push_token: Option<String>,
    pub push_user: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_timeout_seconds: u64,
    /// Identifier for the sending system, included in webhook payloads.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    /// When true, a failed proxy validation aborts the run instead of
    /// falling back to a direct connection.
    pub required: bool,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub validation_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Wall-clock budget for one run; no new items start past this.
    pub budget_seconds: u64,
    pub http_timeout_seconds: u64,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            transcriber: "remote".to_string(),
            fallback: Some("command".to_string()),
            api_endpoint: None,
            api_key: None,
            command_path: None,
            model: Some("base".to_string()),
            language: Some("en".to_string()),
            diarization_endpoint: None,
            chunk: ChunkConfig::default(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window_seconds: 600.0,
            overlap_seconds: 5.0,
            workers: 2,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            min_words: 8,
            gap_tolerance_seconds: 2.0,
            default_speaker: "Speaker A".to_string(),
        }
    }
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            major_pause_seconds: 8.0,
            moderate_pause_seconds: 4.0,
            minor_pause_seconds: 2.0,
            min_words: 8,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            kind: "local-dir".to_string(),
            url: None,
            token: None,
            library_id: None,
            root: String::new(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            push_url: None,
            push_token: None,
            push_user: None,
            webhook_url: None,
            webhook_timeout_seconds: 10,
            source: "quorum".to_string(),
        }
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            required: true,
            proxy_host: None,
            proxy_port: None,
            username: None,
            password: None,
            validation_url: "https://api.ipify.org?format=json".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            budget_seconds: 3 * 3600,
            http_timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
