//! HTTP transcription and diarization engine clients.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{DiarizationEngine, TranscriptionEngine};
use crate::align::{DiarizationSegment, TimedWord, Transcript};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    words: Option<Vec<WordTiming>>,
}

#[derive(Debug, Deserialize)]
struct WordTiming {
    text: String,
    start: f64,
}

#[derive(Debug, Deserialize)]
struct DiarizationResponse {
    segments: Vec<DiarizationSegment>,
}

pub struct RemoteTranscriptionEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    language: String,
}

impl RemoteTranscriptionEngine {
    pub fn new(
        client: reqwest::Client,
        endpoint: Option<String>,
        api_key: Option<String>,
        language: Option<String>,
    ) -> Result<Self> {
        let endpoint = endpoint.context("api_endpoint is required for the remote engine")?;
        let language = language.unwrap_or_else(|| "en".to_string());

        info!("Initialized remote transcription engine: {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            api_key,
            language,
        })
    }

    async fn post_audio(&self, audio_path: &Path) -> Result<TranscriptionResponse> {
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());

        let audio_data = tokio::fs::read(audio_path)
            .await
            .context("Failed to read audio file")?;

        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = backoff_with_jitter(attempt);
                warn!(
                    "Retrying transcription upload in {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_ATTEMPTS
                );
                sleep(backoff).await;
            }

            let part = reqwest::multipart::Part::bytes(audio_data.clone())
                .file_name(file_name.clone())
                .mime_str("application/octet-stream")?;
            let form = reqwest::multipart::Form::new()
                .text("language", self.language.clone())
                .part("file", part);

            let mut request = self.client.post(&self.endpoint).multipart(form);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    last_err = Some(anyhow::Error::from(err).context("Transcription request failed"));
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read transcription response body")?;

            if status.is_server_error() {
                last_err = Some(anyhow::anyhow!(
                    "Transcription service error {}: {}",
                    status,
                    body
                ));
                continue;
            }

            if !status.is_success() {
                error!("Transcription request rejected with {}: {}", status, body);
                anyhow::bail!("Transcription request rejected with status {status}");
            }

            return serde_json::from_str(&body).context("Failed to parse transcription response");
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Transcription upload failed")))
    }
}

#[async_trait]
impl TranscriptionEngine for RemoteTranscriptionEngine {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript> {
        info!("Transcribing {:?} via remote engine", audio_path);

        let response = self.post_audio(audio_path).await?;

        debug!(
            "Remote transcription complete: {} chars, word timings: {}",
            response.text.len(),
            response.words.is_some()
        );

        let words = response.words.map(|words| {
            words
                .into_iter()
                .map(|w| TimedWord {
                    text: w.text,
                    at: w.start,
                })
                .collect()
        });

        Ok(Transcript {
            text: response.text,
            words,
        })
    }
}

pub struct RemoteDiarizationEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDiarizationEngine {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        info!("Initialized remote diarization engine: {}", endpoint);
        Self { client, endpoint }
    }
}

#[async_trait]
impl DiarizationEngine for RemoteDiarizationEngine {
    fn name(&self) -> &'static str {
        "remote-diarizer"
    }

    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>> {
        info!("Diarizing {:?} via remote engine", audio_path);

        let audio_data = tokio::fs::read(audio_path)
            .await
            .context("Failed to read audio file")?;

        let part = reqwest::multipart::Part::bytes(audio_data)
            .file_name("audio.wav")
            .mime_str("application/octet-stream")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("Diarization request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Diarization request failed with status {status}");
        }

        let parsed: DiarizationResponse = response
            .json()
            .await
            .context("Failed to parse diarization response")?;

        let speakers: std::collections::HashSet<_> =
            parsed.segments.iter().map(|s| s.speaker.clone()).collect();
        info!(
            "Diarization complete: {} speakers, {} segments",
            speakers.len(),
            parsed.segments.len()
        );

        Ok(parsed.segments)
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = Duration::from_millis(500 * 2u64.pow(attempt.min(6)));
    let jitter = Duration::from_millis(rand::rng().random_range(0..250));
    base + jitter
}
