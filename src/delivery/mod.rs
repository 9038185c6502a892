//! Dual-destination delivery with asymmetric success semantics.
//!
//! Artifacts go to two independent backends. The Delivery destination is
//! the contractual obligation: the item counts as delivered only if at
//! least one file landed there. The Archive destination is a convenience
//! copy whose failures never block processing, but the manifest (and the
//! downstream webhook that announces it) exists only when the archive
//! copy is complete.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::align::AlignedSegment;
use crate::naming::MeetingMeta;
use crate::notify::{ManifestAnnouncement, ManifestWebhook};
use crate::render::Artifact;

mod destination;
mod object_store;

pub use destination::{Destination, LocalDirDestination};
pub use object_store::ObjectStoreDestination;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub format: String,
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMeeting {
    pub committee: String,
    pub date: String,
    pub session_type: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestTranscript {
    pub base_name: String,
    pub segments_count: usize,
    pub speakers_count: usize,
}

/// Index of everything archived for one meeting. Written next to the
/// archived captions, never before they all landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub created_at: String,
    pub meeting: ManifestMeeting,
    pub transcript: ManifestTranscript,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Copy)]
pub struct TranscriptStats {
    pub segments: usize,
    pub speakers: usize,
}

impl TranscriptStats {
    pub fn from_segments(segments: &[AlignedSegment]) -> Self {
        let speakers: HashSet<&str> =
            segments.iter().map(|s| s.speaker_id.as_str()).collect();
        Self {
            segments: segments.len(),
            speakers: speakers.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryOutcome {
    /// True when the Delivery destination accepted at least one file.
    /// This is what marks the item processed.
    pub delivered: bool,
    pub archived_files: Vec<ManifestFile>,
    pub delivered_files: Vec<String>,
    pub manifest_path: Option<String>,
    pub notified: bool,
}

pub struct DeliveryCoordinator {
    archive: Box<dyn Destination>,
    delivery: Box<dyn Destination>,
    webhook: Option<Box<dyn ManifestWebhook>>,
    store_url: Option<String>,
    store_library_id: Option<String>,
    source: String,
}

impl DeliveryCoordinator {
    pub fn new(
        archive: Box<dyn Destination>,
        delivery: Box<dyn Destination>,
        webhook: Option<Box<dyn ManifestWebhook>>,
        store_url: Option<String>,
        store_library_id: Option<String>,
        source: String,
    ) -> Self {
        Self {
            archive,
            delivery,
            webhook,
            store_url,
            store_library_id,
            source,
        }
    }

    /// Upload one meeting's artifact set to both destinations.
    ///
    /// Per-file failures are collected, never propagated; the staging
    /// directory is removed on every exit path.
    pub async fn deliver(
        &self,
        artifacts: &[Artifact],
        meta: &MeetingMeta,
        stats: TranscriptStats,
    ) -> Result<DeliveryOutcome> {
        let staging = stage_artifacts(artifacts, &meta.base_name)?;
        let mut outcome = DeliveryOutcome::default();

        // Archive: hierarchical committee/date layout.
        let archive_dir = meta.archive_subpath();
        let mut archive_errors = Vec::new();

        if let Err(err) = self.archive.ensure_dir(&archive_dir).await {
            warn!("Archive directory setup failed: {err:#}");
            archive_errors.push(format!("ensure_dir: {err}"));
        } else {
            for (artifact, local) in artifacts.iter().zip(staging.paths()) {
                let filename = format!("{}.{}", meta.base_name, artifact.format.extension());
                let remote = format!("{archive_dir}/{filename}");
                match self.archive.upload_file(local, &remote).await {
                    Ok(()) => outcome.archived_files.push(ManifestFile {
                        format: artifact.format.extension().to_string(),
                        path: remote,
                        filename,
                    }),
                    Err(err) => {
                        error!("Failed to archive {}: {err:#}", filename);
                        archive_errors.push(format!("{filename}: {err}"));
                    }
                }
            }
        }

        // Delivery: flat drop directory.
        for (artifact, local) in artifacts.iter().zip(staging.paths()) {
            let filename = format!("{}.{}", meta.base_name, artifact.format.extension());
            match self.delivery.upload_file(local, &filename).await {
                Ok(()) => outcome.delivered_files.push(filename),
                Err(err) => error!("Failed to deliver {}: {err:#}", filename),
            }
        }

        outcome.delivered = !outcome.delivered_files.is_empty();

        let archive_complete =
            archive_errors.is_empty() && outcome.archived_files.len() == artifacts.len();

        if archive_complete {
            match self.write_manifest(meta, stats, &outcome.archived_files, &staging).await {
                Ok(manifest_path) => {
                    outcome.notified = self.announce(meta, &manifest_path).await;
                    outcome.manifest_path = Some(manifest_path);
                }
                Err(err) => error!("Manifest write failed: {err:#}"),
            }
        } else {
            warn!(
                "Archive incomplete ({} of {} files), skipping manifest",
                outcome.archived_files.len(),
                artifacts.len()
            );
        }

        info!(
            "Delivery outcome for {}: delivered={}, archived={}, manifest={}",
            meta.base_name,
            outcome.delivered,
            outcome.archived_files.len(),
            outcome.manifest_path.is_some()
        );

        Ok(outcome)
    }

    async fn write_manifest(
        &self,
        meta: &MeetingMeta,
        stats: TranscriptStats,
        archived: &[ManifestFile],
        staging: &StagedArtifacts,
    ) -> Result<String> {
        let manifest = Manifest {
            version: "1.0".to_string(),
            created_at: Utc::now().to_rfc3339(),
            meeting: ManifestMeeting {
                committee: meta.committee.clone(),
                date: meta.date.format("%Y-%m-%d").to_string(),
                session_type: meta.session_type.prefix().to_string(),
                start_time: meta.start_time.clone(),
                end_time: meta.end_time.clone(),
            },
            transcript: ManifestTranscript {
                base_name: meta.base_name.clone(),
                segments_count: stats.segments,
                speakers_count: stats.speakers,
            },
            files: archived.to_vec(),
        };

        let local = staging.dir().join("manifest.json");
        let content =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        std::fs::write(&local, content).context("Failed to stage manifest")?;

        let remote = meta.manifest_subpath();
        self.archive
            .upload_file(&local, &remote)
            .await
            .context("Failed to upload manifest")?;

        info!("Manifest archived at {}", remote);
        Ok(remote)
    }

    /// Fire-and-forget webhook; failure is logged only.
    async fn announce(&self, meta: &MeetingMeta, manifest_path: &str) -> bool {
        let Some(webhook) = &self.webhook else {
            return false;
        };

        let announcement = ManifestAnnouncement {
            committee: meta.committee.clone(),
            date: meta.date.format("%Y-%m-%d").to_string(),
            manifest_path: manifest_path.to_string(),
            store_url: self.store_url.clone(),
            store_library_id: self.store_library_id.clone(),
            source: self.source.clone(),
        };

        match webhook.announce(&announcement).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Manifest webhook failed: {err:#}");
                false
            }
        }
    }
}

/// Artifacts written to a scoped temporary directory. Dropping this
/// removes every staged file, including on error paths.
struct StagedArtifacts {
    dir: TempDir,
    paths: Vec<std::path::PathBuf>,
}

impl StagedArtifacts {
    fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    fn paths(&self) -> impl Iterator<Item = &std::path::PathBuf> {
        self.paths.iter()
    }
}

fn stage_artifacts(artifacts: &[Artifact], base_name: &str) -> Result<StagedArtifacts> {
    let dir = TempDir::new().context("Failed to create staging directory")?;
    let mut paths = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
        let path = dir
            .path()
            .join(format!("{}.{}", base_name, artifact.format.extension()));
        std::fs::write(&path, &artifact.content)
            .with_context(|| format!("Failed to stage {:?}", path))?;
        paths.push(path);
    }

    Ok(StagedArtifacts { dir, paths })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::Confidence;
    use crate::naming::MeetingMeta;
    use crate::render::{render_all, ArtifactFormat};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MockDestination {
        fail_uploads: bool,
        uploads: Mutex<Vec<String>>,
    }

    impl MockDestination {
        fn working() -> Self {
            Self {
                fail_uploads: false,
                uploads: Mutex::new(Vec::new()),
            }
        }

        fn broken() -> Self {
            Self {
                fail_uploads: true,
                uploads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Destination for MockDestination {
        fn name(&self) -> String {
            "mock".to_string()
        }

        async fn ensure_dir(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn upload_file(&self, _local: &Path, remote: &str) -> Result<()> {
            if self.fail_uploads {
                anyhow::bail!("upload rejected");
            }
            self.uploads.lock().unwrap().push(remote.to_string());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct MockWebhook {
        called: std::sync::Arc<AtomicBool>,
    }

    impl MockWebhook {
        fn new() -> Self {
            Self {
                called: std::sync::Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl ManifestWebhook for MockWebhook {
        async fn announce(&self, announcement: &ManifestAnnouncement) -> Result<()> {
            assert!(announcement.manifest_path.contains("manifests/manifest.json"));
            self.called.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn meta() -> MeetingMeta {
        MeetingMeta::from_title(
            "IC - Legislative Finance 9:00 AM - 11:00 AM",
            NaiveDate::from_ymd_opt(2026, 1, 12)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn artifacts() -> Vec<Artifact> {
        let segments = vec![AlignedSegment {
            speaker_id: "Speaker A".to_string(),
            text: "Good morning and welcome to the hearing today".to_string(),
            start: 0.0,
            end: 10.0,
            confidence: Confidence::High,
            reason: "test".to_string(),
        }];
        render_all(&segments)
    }

    fn stats() -> TranscriptStats {
        TranscriptStats {
            segments: 1,
            speakers: 1,
        }
    }

    fn coordinator(
        archive: MockDestination,
        delivery: MockDestination,
        webhook: Option<Box<dyn ManifestWebhook>>,
    ) -> DeliveryCoordinator {
        DeliveryCoordinator::new(
            Box::new(archive),
            Box::new(delivery),
            webhook,
            Some("https://store.example.test".to_string()),
            Some("lib-1".to_string()),
            "quorum".to_string(),
        )
    }

    #[tokio::test]
    async fn full_success_archives_delivers_and_notifies() {
        let webhook = MockWebhook::new();
        let called = webhook.called.clone();

        let coordinator = DeliveryCoordinator::new(
            Box::new(MockDestination::working()),
            Box::new(MockDestination::working()),
            Some(Box::new(webhook)),
            None,
            None,
            "quorum".to_string(),
        );

        let outcome = coordinator
            .deliver(&artifacts(), &meta(), stats())
            .await
            .unwrap();

        assert!(outcome.delivered);
        assert_eq!(outcome.archived_files.len(), 5);
        assert_eq!(outcome.delivered_files.len(), 5);
        assert!(outcome.manifest_path.is_some());
        assert!(outcome.notified);
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn delivery_failure_with_archive_success_is_not_delivered() {
        let coordinator = coordinator(MockDestination::working(), MockDestination::broken(), None);

        let outcome = coordinator
            .deliver(&artifacts(), &meta(), stats())
            .await
            .unwrap();

        assert!(!outcome.delivered);
        assert!(outcome.delivered_files.is_empty());
        // Archive is independent: the copy and its manifest still exist.
        assert_eq!(outcome.archived_files.len(), 5);
        assert!(outcome.manifest_path.is_some());
    }

    #[tokio::test]
    async fn archive_failure_with_delivery_success_skips_manifest() {
        let coordinator = coordinator(MockDestination::broken(), MockDestination::working(), None);

        let outcome = coordinator
            .deliver(&artifacts(), &meta(), stats())
            .await
            .unwrap();

        assert!(outcome.delivered);
        assert!(outcome.archived_files.is_empty());
        assert!(outcome.manifest_path.is_none());
        assert!(!outcome.notified);
    }

    #[tokio::test]
    async fn archive_paths_follow_committee_date_hierarchy() {
        let coordinator = coordinator(MockDestination::working(), MockDestination::working(), None);

        let outcome = coordinator
            .deliver(&artifacts(), &meta(), stats())
            .await
            .unwrap();

        for file in &outcome.archived_files {
            assert!(
                file.path.starts_with("Interim/LFC/2026-01-12/captions/"),
                "{}",
                file.path
            );
            assert!(file.filename.starts_with("20260112-IC-LFC-900AM-1100AM."));
        }
        assert_eq!(
            outcome.manifest_path.as_deref(),
            Some("Interim/LFC/2026-01-12/manifests/manifest.json")
        );

        let formats: Vec<&str> = outcome
            .archived_files
            .iter()
            .map(|f| f.format.as_str())
            .collect();
        assert_eq!(formats, vec!["json", "csv", "txt", "vtt", "srt"]);
    }

    #[tokio::test]
    async fn staging_directory_is_removed_after_delivery() {
        let staged = stage_artifacts(&artifacts(), "base").unwrap();
        let dir = staged.dir().to_path_buf();
        assert!(dir.exists());
        drop(staged);
        assert!(!dir.exists());
    }

    #[test]
    fn stats_count_unique_speakers() {
        let segments = vec![
            AlignedSegment {
                speaker_id: "Speaker A".into(),
                text: "a".into(),
                start: 0.0,
                end: 1.0,
                confidence: Confidence::High,
                reason: String::new(),
            },
            AlignedSegment {
                speaker_id: "Speaker B".into(),
                text: "b".into(),
                start: 1.0,
                end: 2.0,
                confidence: Confidence::High,
                reason: String::new(),
            },
            AlignedSegment {
                speaker_id: "Speaker A".into(),
                text: "c".into(),
                start: 2.0,
                end: 3.0,
                confidence: Confidence::High,
                reason: String::new(),
            },
        ];

        let stats = TranscriptStats::from_segments(&segments);
        assert_eq!(stats.segments, 3);
        assert_eq!(stats.speakers, 2);
    }

    #[test]
    fn artifact_format_order_is_stable() {
        assert_eq!(ArtifactFormat::all().len(), 5);
    }
}
