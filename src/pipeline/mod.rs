//! Run orchestration: discover candidate meetings and take each one
//! through transcribe → diarize → align → serialize → deliver, with the
//! retry ledger doing the outcome bookkeeping.
//!
//! All dependencies are injected via constructor; no concrete types
//! hardcoded and no process-wide state. Entries are processed strictly
//! one at a time so the shared ledger files never see concurrent
//! writers.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::align::{align_transcript, Transcript};
use crate::chunk::{self, AudioSlicer};
use crate::config::{AlignmentConfig, ChunkConfig, Config, RunConfig};
use crate::delivery::{
    DeliveryCoordinator, Destination, LocalDirDestination, ObjectStoreDestination,
    TranscriptStats,
};
use crate::discover::{
    filter_test_meetings, new_entries, EntriesStore, MediaFetcher, MeetingSource,
    ProcessingEntry,
};
use crate::egress::Egress;
use crate::engines::{build_diarizer, DiarizationEngine, Transcriber};
use crate::error::PipelineError;
use crate::global;
use crate::ledger::RetryLedger;
use crate::naming::{parse_meeting_datetime, MeetingMeta};
use crate::notify::{Alert, AlertService, AlertSink, HttpWebhook, ManifestWebhook, PushSink};
use crate::render::render_all;

/// Structured result of one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub found: usize,
    pub new: usize,
    pub processed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Pipeline knobs the orchestrator needs at processing time.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub alignment: AlignmentConfig,
    pub chunk: ChunkConfig,
    pub run: RunConfig,
    /// Scratch directory emptied once a day, with its marker file.
    /// `None` disables the cleanup.
    pub downloads_dir: Option<std::path::PathBuf>,
    pub cleanup_marker: Option<std::path::PathBuf>,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            alignment: config.alignment.clone(),
            chunk: config.engines.chunk.clone(),
            run: config.run.clone(),
            downloads_dir: global::downloads_dir().ok(),
            cleanup_marker: global::last_cleanup_file().ok(),
        }
    }
}

pub struct Orchestrator {
    source: Box<dyn MeetingSource>,
    fetcher: Box<dyn MediaFetcher>,
    slicer: Option<Box<dyn AudioSlicer>>,
    transcriber: Arc<Transcriber>,
    diarizer: Option<Box<dyn DiarizationEngine>>,
    coordinator: DeliveryCoordinator,
    ledger: RetryLedger,
    alerts: AlertService,
    entries_store: EntriesStore,
    settings: PipelineSettings,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn MeetingSource>,
        fetcher: Box<dyn MediaFetcher>,
        slicer: Option<Box<dyn AudioSlicer>>,
        transcriber: Arc<Transcriber>,
        diarizer: Option<Box<dyn DiarizationEngine>>,
        coordinator: DeliveryCoordinator,
        ledger: RetryLedger,
        alerts: AlertService,
        entries_store: EntriesStore,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            slicer,
            transcriber,
            diarizer,
            coordinator,
            ledger,
            alerts,
            entries_store,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire up a production orchestrator from config and the validated
    /// egress client.
    pub fn from_config(
        config: &Config,
        egress: &Egress,
        source: Box<dyn MeetingSource>,
        fetcher: Box<dyn MediaFetcher>,
        slicer: Option<Box<dyn AudioSlicer>>,
    ) -> Result<Self> {
        let transcriber = Arc::new(Transcriber::from_config(
            &config.engines,
            egress.client.clone(),
        )?);
        let diarizer = build_diarizer(&config.engines, egress.client.clone());

        let archive = build_destination(&config.archive, egress.client.clone())
            .context("Archive destination")?;
        let delivery = build_destination(&config.delivery, egress.client.clone())
            .context("Delivery destination")?;

        let webhook = HttpWebhook::from_config(&config.notify, egress.client.clone());
        let coordinator = DeliveryCoordinator::new(
            archive,
            delivery,
            webhook.map(|w| Box::new(w) as Box<dyn ManifestWebhook>),
            config.archive.url.clone(),
            config.archive.library_id.clone(),
            config.notify.source.clone(),
        );

        let ledger = RetryLedger::open_default(&config.retry)?;
        let alerts = AlertService::new(
            PushSink::from_config(&config.notify, egress.client.clone())
                .map(|s| Box::new(s) as Box<dyn AlertSink>),
        );
        let entries_store = EntriesStore::new(global::entries_file()?);

        Ok(Self::new(
            source,
            fetcher,
            slicer,
            transcriber,
            diarizer,
            coordinator,
            ledger,
            alerts,
            entries_store,
            PipelineSettings::from(config),
        ))
    }

    /// Flag checked between items; in-flight work finishes, nothing new
    /// starts.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// One full processing run.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        info!("Run starting: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

        self.daily_cleanup();

        let current = self
            .source
            .current_entries()
            .await
            .context("Failed to fetch current entries")?;

        let stored = self.entries_store.read();
        let fresh = new_entries(&current, &stored, |link| self.ledger.should_skip(link));
        let fresh = filter_test_meetings(fresh);

        let mut summary = RunSummary {
            found: current.len(),
            new: fresh.len(),
            ..Default::default()
        };

        if fresh.is_empty() {
            info!("No new entries to process");
        }

        let budget = Duration::from_secs(self.settings.run.budget_seconds);

        for (i, entry) in fresh.iter().enumerate() {
            if self.shutdown.load(Ordering::SeqCst) {
                warn!("Shutdown requested, not starting remaining {} entries", fresh.len() - i);
                break;
            }
            if started.elapsed() >= budget {
                warn!(
                    "Run budget ({}s) exhausted, not starting remaining {} entries",
                    budget.as_secs(),
                    fresh.len() - i
                );
                break;
            }

            info!("Processing entry {}/{}: {}", i + 1, fresh.len(), entry.title);
            match self.process_entry(entry).await {
                Ok(()) => summary.processed += 1,
                Err(err) => {
                    summary.failed += 1;
                    self.handle_failure(entry, err).await;
                }
            }
        }

        self.entries_store
            .write(&current)
            .context("Failed to persist entries")?;

        info!(
            "Run summary: found={} new={} processed={} failed={} duration={:.1}s",
            summary.found,
            summary.new,
            summary.processed,
            summary.failed,
            started.elapsed().as_secs_f64()
        );

        Ok(summary)
    }

    /// Process one meeting end to end. All failures come back as
    /// [`PipelineError`] so the caller can route them through the
    /// ledger.
    pub async fn process_entry(&self, entry: &ProcessingEntry) -> Result<(), PipelineError> {
        let link = entry
            .source_link
            .as_deref()
            .ok_or_else(|| PipelineError::validation("entry has no video link"))?;

        if self.ledger.should_skip(link) {
            info!("Entry already processed, skipping: {link}");
            return Ok(());
        }

        let started = Instant::now();
        let meeting_start = parse_meeting_datetime(&entry.title)
            .unwrap_or_else(|| Utc::now().naive_utc());
        let meta = MeetingMeta::from_title(&entry.title, meeting_start);

        let audio = self
            .fetcher
            .fetch_audio(entry)
            .await
            .map_err(|e| PipelineError::transient(format!("media fetch failed: {e:#}")))?;

        let transcript = self
            .transcribe(&audio.audio_path, audio.duration_seconds)
            .await
            .map_err(|e| PipelineError::engine("transcription", format!("{e:#}")))?;

        if transcript.text.split_whitespace().next().is_none() {
            self.remove_audio(&audio.audio_path);
            return Err(PipelineError::engine("transcription", "no text returned"));
        }

        let diarization = match &self.diarizer {
            Some(diarizer) => match diarizer.diarize(&audio.audio_path).await {
                Ok(segments) => segments,
                Err(err) => {
                    warn!("Diarization failed: {err:#}, using single speaker");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let segments = align_transcript(
            &transcript,
            &diarization,
            audio.duration_seconds,
            &self.settings.alignment,
        );

        self.remove_audio(&audio.audio_path);

        if segments.is_empty() {
            return Err(PipelineError::engine("alignment", "no segments extracted"));
        }

        let stats = TranscriptStats::from_segments(&segments);
        let artifacts = render_all(&segments);

        let outcome = self
            .coordinator
            .deliver(&artifacts, &meta, stats)
            .await
            .map_err(|e| PipelineError::transient(format!("delivery staging failed: {e:#}")))?;

        if !outcome.delivered {
            return Err(PipelineError::delivery(
                "delivery destination rejected every file",
            ));
        }

        if let Err(err) = self.ledger.record_success(link) {
            error!("Failed to record success for {link}: {err:#}");
        }

        info!(
            "Entry delivered: {} ({} segments, {} speakers, {} archived, manifest: {})",
            meta.base_name,
            stats.segments,
            stats.speakers,
            outcome.archived_files.len(),
            outcome.manifest_path.is_some()
        );

        self.alerts
            .send(Alert::success(
                &meta.committee,
                &meta.date_display(),
                &meta.time_display(),
                started.elapsed().as_secs_f64(),
                &meta.base_name,
            ))
            .await;

        Ok(())
    }

    /// Transcribe directly, or through the chunked worker pool when the
    /// recording exceeds one window and a slicer is available.
    async fn transcribe(&self, audio_path: &Path, duration: f64) -> Result<Transcript> {
        if duration > self.settings.chunk.window_seconds {
            if let Some(slicer) = &self.slicer {
                let windows = chunk::plan_windows(duration, &self.settings.chunk);
                let chunks = slicer.slice(audio_path, &windows).await?;
                return chunk::transcribe_chunks(
                    Arc::clone(&self.transcriber),
                    chunks,
                    &self.settings.chunk,
                )
                .await;
            }
        }
        self.transcriber.transcribe(audio_path).await
    }

    /// Route a per-entry failure through the ledger and the alerting
    /// tiers.
    async fn handle_failure(&self, entry: &ProcessingEntry, err: PipelineError) {
        error!("Entry failed: {err}");

        let meeting_start = parse_meeting_datetime(&entry.title)
            .unwrap_or_else(|| Utc::now().naive_utc());
        let meta = MeetingMeta::from_title(&entry.title, meeting_start);
        let date = meta.date_display();
        let time = meta.time_display();

        if !err.is_retryable() {
            self.alerts
                .send(Alert::validation(&meta.committee, &date, &time, &err.reason()))
                .await;
            return;
        }

        let Some(link) = entry.source_link.as_deref() else {
            return;
        };

        match self.ledger.record_failure(link, &err.reason()) {
            Ok(outcome) if outcome.abandoned => {
                self.alerts
                    .send(Alert::abandoned(
                        &meta.committee,
                        &date,
                        &time,
                        &err.reason(),
                        self.ledger.max_retries(),
                    ))
                    .await;
            }
            Ok(outcome) => {
                self.alerts
                    .send(Alert::retry_pending(
                        &meta.committee,
                        &date,
                        &time,
                        &err.reason(),
                        outcome.count,
                        self.ledger.max_retries(),
                    ))
                    .await;
            }
            Err(ledger_err) => {
                error!("Ledger update failed for {link}: {ledger_err:#}");
            }
        }
    }

    fn remove_audio(&self, path: &Path) {
        if path.exists() {
            if let Err(err) = std::fs::remove_file(path) {
                warn!("Could not clean up audio file {:?}: {err}", path);
            }
        }
    }

    /// Once a day, empty the downloads directory.
    fn daily_cleanup(&self) {
        let (Some(downloads), Some(marker)) = (
            self.settings.downloads_dir.as_ref(),
            self.settings.cleanup_marker.as_ref(),
        ) else {
            return;
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let last = std::fs::read_to_string(marker).unwrap_or_default();
        if last.trim() == today {
            return;
        }

        if let Ok(read_dir) = std::fs::read_dir(downloads) {
            let mut removed = 0usize;
            for dir_entry in read_dir.flatten() {
                if dir_entry.path().is_file() && std::fs::remove_file(dir_entry.path()).is_ok() {
                    removed += 1;
                }
            }
            if removed > 0 {
                info!("Daily cleanup removed {removed} downloaded file(s)");
            }
        }

        if let Some(parent) = marker.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::write(marker, &today) {
            warn!("Could not update cleanup marker: {err}");
        }
    }
}

fn build_destination(
    config: &crate::config::DestinationConfig,
    client: reqwest::Client,
) -> Result<Box<dyn Destination>> {
    match config.kind.as_str() {
        "object-store" => Ok(Box::new(ObjectStoreDestination::from_config(config, client)?)),
        "local-dir" => Ok(Box::new(LocalDirDestination::from_config(config)?)),
        other => anyhow::bail!(
            "Unknown destination kind '{other}'. Supported kinds: object-store, local-dir"
        ),
    }
}
