//! End-to-end flow over the caption-only path: detect turns, render
//! every format, deliver to both destinations, verify the manifest.

use chrono::NaiveDate;
use quorum::config::{RetryConfig, TurnsConfig};
use quorum::delivery::{
    DeliveryCoordinator, LocalDirDestination, Manifest, TranscriptStats,
};
use quorum::ledger::RetryLedger;
use quorum::naming::MeetingMeta;
use quorum::render::render_all;
use quorum::turns::{turns_to_segments, CaptionSegment, TurnSegmenter};
use tempfile::tempdir;

fn captions() -> Vec<CaptionSegment> {
    let filler = "and we will continue with the items on the agenda before the committee";
    vec![
        CaptionSegment {
            begin: 0.0,
            end: 6.0,
            text: format!("Calling this meeting to order {filler}"),
        },
        CaptionSegment {
            begin: 6.2,
            end: 12.0,
            text: format!("first on the docket is the budget report {filler}"),
        },
        // 10s of silence before a new voice.
        CaptionSegment {
            begin: 22.0,
            end: 30.0,
            text: format!(
                "Good morning, Madam Chair, my name is Elena Vargas, presenting the fiscal outlook {filler}"
            ),
        },
        CaptionSegment {
            begin: 41.0,
            end: 48.0,
            text: format!("Thank you for that presentation, questions from members {filler}"),
        },
    ]
}

#[tokio::test]
async fn captions_flow_from_turns_to_manifest() {
    let segmenter = TurnSegmenter::new(TurnsConfig::default());
    let turns = segmenter.segment(&captions());

    assert!(turns.len() >= 2, "expected multiple speaker turns");
    assert!(turns.iter().any(|t| t.speaker_label == "Elena Vargas"));

    let segments = turns_to_segments(&turns);
    let artifacts = render_all(&segments);
    assert_eq!(artifacts.len(), 5);

    let meta = MeetingMeta::from_title(
        "IC - Legislative Finance 9:00 AM - 11:00 AM",
        NaiveDate::from_ymd_opt(2026, 1, 12)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap(),
    );

    let root = tempdir().unwrap();
    let archive_root = root.path().join("archive");
    let delivery_root = root.path().join("delivery");

    let coordinator = DeliveryCoordinator::new(
        Box::new(LocalDirDestination::new(&archive_root)),
        Box::new(LocalDirDestination::new(&delivery_root)),
        None,
        None,
        None,
        "quorum-test".to_string(),
    );

    let stats = TranscriptStats::from_segments(&segments);
    let outcome = coordinator
        .deliver(&artifacts, &meta, stats)
        .await
        .unwrap();

    assert!(outcome.delivered);
    assert_eq!(outcome.delivered_files.len(), 5);
    assert_eq!(outcome.archived_files.len(), 5);

    // Delivery is flat; archive is hierarchical.
    assert!(delivery_root
        .join("20260112-IC-LFC-900AM-1100AM.json")
        .exists());
    let captions_dir = archive_root.join("Interim/LFC/2026-01-12/captions");
    assert!(captions_dir.join("20260112-IC-LFC-900AM-1100AM.srt").exists());

    // The manifest indexes exactly what was archived.
    let manifest_raw = std::fs::read_to_string(
        archive_root.join("Interim/LFC/2026-01-12/manifests/manifest.json"),
    )
    .unwrap();
    let manifest: Manifest = serde_json::from_str(&manifest_raw).unwrap();

    assert_eq!(manifest.meeting.committee, "LFC");
    assert_eq!(manifest.meeting.date, "2026-01-12");
    assert_eq!(manifest.transcript.segments_count, segments.len());
    assert_eq!(manifest.transcript.speakers_count, stats.speakers);
    assert_eq!(manifest.files.len(), 5);
    for file in &manifest.files {
        assert!(archive_root.join(&file.path).exists(), "{}", file.path);
    }
}

#[test]
fn ledger_state_survives_reopening() {
    let dir = tempdir().unwrap();
    let processed = dir.path().join("processed_entries.json");
    let retries = dir.path().join("retry_counts.json");
    let config = RetryConfig { max_retries: 3 };

    {
        let ledger = RetryLedger::new(processed.clone(), retries.clone(), &config);
        ledger.record_failure("https://example.test/m/1", "Download Failed").unwrap();
        ledger.record_success("https://example.test/m/2").unwrap();
    }

    let reopened = RetryLedger::new(processed, retries, &config);
    assert_eq!(reopened.retry_count("https://example.test/m/1"), 1);
    assert!(!reopened.should_skip("https://example.test/m/1"));
    assert!(reopened.should_skip("https://example.test/m/2"));
}
