//! Local subprocess transcription engine.
//!
//! Runs an installed speech-to-text binary (whisper-style CLI) against
//! the audio file and reads the transcript from stdout. Serves as the
//! fallback when the remote engine is unreachable.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use super::TranscriptionEngine;
use crate::align::Transcript;

pub struct CommandEngine {
    command_path: PathBuf,
    model: String,
    language: String,
}

impl CommandEngine {
    pub fn new(
        command_path: Option<String>,
        model: Option<String>,
        language: Option<String>,
    ) -> Result<Self> {
        let command_path = command_path
            .map(PathBuf::from)
            .context("command_path is required for the command engine")?;
        let model = model.unwrap_or_else(|| "base".to_string());
        let language = language.unwrap_or_else(|| "en".to_string());

        info!("Initialized command engine: {:?}", command_path);

        Ok(Self {
            command_path,
            model,
            language,
        })
    }
}

#[async_trait]
impl TranscriptionEngine for CommandEngine {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        if !audio_path.exists() {
            bail!("Audio file not found: {:?}", audio_path);
        }

        info!("Transcribing {:?} via {:?}", audio_path, self.command_path);

        let output = Command::new(&self.command_path)
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--language")
            .arg(&self.language)
            .output()
            .await
            .with_context(|| format!("Failed to run {:?}", self.command_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Transcription command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            warn!("Transcription command produced no output");
        }

        Ok(Transcript::plain(text))
    }
}
