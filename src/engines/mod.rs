//! Speech-recognition and diarization engine boundaries.
//!
//! The engines themselves are external black boxes: one returns
//! transcript text (optionally with word timestamps), the other returns
//! speaker-labeled time intervals. Everything behind these traits is an
//! I/O wrapper; the pipeline only depends on the contracts.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

use crate::align::{DiarizationSegment, Transcript};
use crate::config::EnginesConfig;

mod command;
mod remote;

pub use command::CommandEngine;
pub use remote::{RemoteDiarizationEngine, RemoteTranscriptionEngine};

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript>;
}

#[async_trait]
pub trait DiarizationEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// May legitimately return an empty set; the caller falls back to a
    /// single-speaker alignment.
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>>;
}

/// Primary engine plus an optional fallback tried when the primary
/// errors.
pub struct Transcriber {
    primary: Box<dyn TranscriptionEngine>,
    fallback: Option<Box<dyn TranscriptionEngine>>,
}

impl Transcriber {
    pub fn from_config(config: &EnginesConfig, client: reqwest::Client) -> Result<Self> {
        let primary = build_engine(&config.transcriber, config, client.clone())?;
        let fallback = match &config.fallback {
            Some(name) if name != &config.transcriber => {
                Some(build_engine(name, config, client)?)
            }
            _ => None,
        };

        info!("Using {} for transcription", primary.name());

        Ok(Self { primary, fallback })
    }

    pub fn new(
        primary: Box<dyn TranscriptionEngine>,
        fallback: Option<Box<dyn TranscriptionEngine>>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        match self.primary.transcribe(audio_path).await {
            Ok(transcript) => Ok(transcript),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        "{} failed: {}, falling back to {}",
                        self.primary.name(),
                        err,
                        fallback.name()
                    );
                    fallback.transcribe(audio_path).await
                }
                None => Err(err),
            },
        }
    }
}

pub fn build_engine(
    name: &str,
    config: &EnginesConfig,
    client: reqwest::Client,
) -> Result<Box<dyn TranscriptionEngine>> {
    let engine: Box<dyn TranscriptionEngine> = match name {
        "remote" => Box::new(RemoteTranscriptionEngine::new(
            client,
            config.api_endpoint.clone(),
            config.api_key.clone(),
            config.language.clone(),
        )?),
        "command" => Box::new(CommandEngine::new(
            config.command_path.clone(),
            config.model.clone(),
            config.language.clone(),
        )?),
        _ => bail!(
            "Unknown transcription engine '{}'. Supported engines: remote, command",
            name
        ),
    };

    Ok(engine)
}

/// Diarization engine from config, or `None` when no endpoint is set.
pub fn build_diarizer(
    config: &EnginesConfig,
    client: reqwest::Client,
) -> Option<Box<dyn DiarizationEngine>> {
    config
        .diarization_endpoint
        .clone()
        .map(|endpoint| -> Box<dyn DiarizationEngine> {
            Box::new(RemoteDiarizationEngine::new(client, endpoint))
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted engine for orchestrator and fallback tests.
    pub struct ScriptedEngine {
        pub engine_name: &'static str,
        pub text: Option<String>,
        pub calls: AtomicUsize,
    }

    impl ScriptedEngine {
        pub fn ok(name: &'static str, text: &str) -> Self {
            Self {
                engine_name: name,
                text: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                engine_name: name,
                text: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscriptionEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            self.engine_name
        }

        async fn transcribe(&self, _audio_path: &Path) -> Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.text {
                Some(text) => Ok(Transcript::plain(text.clone())),
                None => bail!("{} is down", self.engine_name),
            }
        }
    }
}
