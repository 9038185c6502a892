//! Alignment of transcript text with speaker-diarization timing.
//!
//! The transcription engine returns plain text (optionally with
//! word-level timestamps); the diarization engine returns speaker-labeled
//! time intervals. This module merges the two into speaker-attributed
//! segments.
//!
//! Two strategies exist. Proportional allocation distributes words across
//! diarized intervals by interval duration and is the default, because
//! word timestamps are not guaranteed to exist. When they do exist, the
//! time-lookup strategy assigns each word the speaker of the interval
//! containing its timestamp.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AlignmentConfig;

pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// One speaker-labeled interval from the diarization engine. Labels are
/// opaque and not stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

impl DiarizationSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A transcript word with a known timestamp.
#[derive(Debug, Clone)]
pub struct TimedWord {
    pub text: String,
    pub at: f64,
}

/// Engine output handed to the aligner.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub text: String,
    /// Word-level timestamps, when the engine provides them.
    pub words: Option<Vec<TimedWord>>,
}

impl Transcript {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            words: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// A speaker-attributed transcript segment. Sorted by `start`, pairwise
/// non-overlapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignedSegment {
    pub speaker_id: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub confidence: Confidence,
    pub reason: String,
}

impl AlignedSegment {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Align a transcript with diarization output.
///
/// Strategy selection happens here and nowhere else: time-lookup when the
/// transcript carries word timestamps, proportional allocation otherwise.
pub fn align_transcript(
    transcript: &Transcript,
    diarization: &[DiarizationSegment],
    audio_duration: f64,
    config: &AlignmentConfig,
) -> Vec<AlignedSegment> {
    if diarization.is_empty() {
        return single_speaker_fallback(&transcript.text, audio_duration, config);
    }

    let raw = match &transcript.words {
        Some(words) if !words.is_empty() => {
            debug!("Aligning {} timed words against {} diarized intervals", words.len(), diarization.len());
            align_by_time_lookup(words, diarization, config)
        }
        _ => align_proportionally(&transcript.text, diarization, audio_duration, config),
    };

    let merged = merge_segments(raw, config.min_words);
    normalize_speaker_labels(merged)
}

/// Whole transcript under the default speaker when diarization produced
/// nothing.
fn single_speaker_fallback(
    text: &str,
    audio_duration: f64,
    config: &AlignmentConfig,
) -> Vec<AlignedSegment> {
    if text.split_whitespace().next().is_none() {
        return Vec::new();
    }
    vec![AlignedSegment {
        speaker_id: config.default_speaker.clone(),
        text: text.split_whitespace().collect::<Vec<_>>().join(" "),
        start: 0.0,
        end: audio_duration.max(0.0),
        confidence: Confidence::Medium,
        reason: "no diarization".to_string(),
    }]
}

/// Distribute words across diarized intervals proportionally to interval
/// duration. Rounding remainders land in the final segment so no word is
/// ever dropped.
fn align_proportionally(
    text: &str,
    diarization: &[DiarizationSegment],
    audio_duration: f64,
    config: &AlignmentConfig,
) -> Vec<AlignedSegment> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let total_duration: f64 = diarization.iter().map(|s| s.duration()).sum();
    if total_duration <= 0.0 {
        return single_speaker_fallback(text, audio_duration, config);
    }

    let words_per_second = words.len() as f64 / total_duration;

    let mut segments = Vec::new();
    let mut word_idx = 0usize;

    for (i, seg) in diarization.iter().enumerate() {
        let remaining = words.len() - word_idx;
        if remaining == 0 {
            break;
        }

        let mut take = (seg.duration() * words_per_second).round() as usize;
        take = take.min(remaining);
        // Everything left belongs to the last interval.
        if i == diarization.len() - 1 {
            take = remaining;
        }
        if take == 0 {
            continue;
        }

        let seg_words = &words[word_idx..word_idx + take];
        word_idx += take;

        segments.push(AlignedSegment {
            speaker_id: seg.speaker.clone(),
            text: seg_words.join(" "),
            start: seg.start,
            end: seg.end,
            confidence: Confidence::Medium,
            reason: "proportional allocation".to_string(),
        });
    }

    // Rounding can exhaust the intervals before the words.
    if word_idx < words.len() {
        let rest = words[word_idx..].join(" ");
        if let Some(last) = segments.last_mut() {
            last.text.push(' ');
            last.text.push_str(&rest);
        }
    }

    segments
}

/// Assign each timed word the speaker of the interval containing it,
/// falling back to the nearest interval boundary within the gap
/// tolerance, else `UNKNOWN`.
fn align_by_time_lookup(
    words: &[TimedWord],
    diarization: &[DiarizationSegment],
    config: &AlignmentConfig,
) -> Vec<AlignedSegment> {
    let mut segments: Vec<AlignedSegment> = Vec::new();

    for word in words {
        let (speaker, exact) = speaker_at(word.at, diarization, config.gap_tolerance_seconds);

        match segments.last_mut() {
            Some(last) if last.speaker_id == speaker => {
                last.text.push(' ');
                last.text.push_str(&word.text);
                last.end = last.end.max(word.at);
                if !exact {
                    last.confidence = Confidence::Medium;
                }
            }
            _ => {
                segments.push(AlignedSegment {
                    speaker_id: speaker,
                    text: word.text.clone(),
                    start: word.at,
                    end: word.at,
                    confidence: if exact {
                        Confidence::High
                    } else {
                        Confidence::Medium
                    },
                    reason: "word timestamps".to_string(),
                });
            }
        }
    }

    segments
}

/// Speaker owning timestamp `t`. The bool is true for an exact interval
/// hit, false for a tolerance fallback.
fn speaker_at(t: f64, diarization: &[DiarizationSegment], tolerance: f64) -> (String, bool) {
    for seg in diarization {
        if t >= seg.start && t <= seg.end {
            return (seg.speaker.clone(), true);
        }
    }

    let mut best: Option<(&DiarizationSegment, f64)> = None;
    for seg in diarization {
        let gap = if t < seg.start {
            seg.start - t
        } else {
            t - seg.end
        };
        if best.map_or(true, |(_, b)| gap < b) {
            best = Some((seg, gap));
        }
    }

    match best {
        Some((seg, gap)) if gap <= tolerance => (seg.speaker.clone(), false),
        _ => (UNKNOWN_SPEAKER.to_string(), false),
    }
}

/// Collapse consecutive same-speaker segments, fold segments under the
/// word threshold into their predecessor, and enforce ordering and
/// non-overlap.
fn merge_segments(segments: Vec<AlignedSegment>, min_words: usize) -> Vec<AlignedSegment> {
    let mut merged: Vec<AlignedSegment> = Vec::with_capacity(segments.len());

    for seg in segments {
        match merged.last_mut() {
            Some(prev) if prev.speaker_id == seg.speaker_id => {
                prev.text.push(' ');
                prev.text.push_str(&seg.text);
                prev.end = prev.end.max(seg.end);
                if seg.confidence == Confidence::Medium {
                    prev.confidence = Confidence::Medium;
                }
            }
            _ => merged.push(seg),
        }
    }

    let mut folded: Vec<AlignedSegment> = Vec::with_capacity(merged.len());
    for seg in merged {
        let is_short = seg.word_count() < min_words;
        match folded.last_mut() {
            Some(prev) if is_short => {
                prev.text.push(' ');
                prev.text.push_str(&seg.text);
                prev.end = prev.end.max(seg.end);
                if prev.confidence == Confidence::High || seg.confidence == Confidence::High {
                    prev.confidence = Confidence::Medium;
                }
            }
            _ => folded.push(seg),
        }
    }

    for i in 1..folded.len() {
        let prev_end = folded[i - 1].end;
        if folded[i].start < prev_end {
            folded[i].start = prev_end;
            if folded[i].end < folded[i].start {
                folded[i].end = folded[i].start;
            }
        }
    }

    folded
}

/// Rewrite raw diarization labels as `Speaker A`, `Speaker B`, … in
/// discovery order. Labels already in that shape are kept. The mapping
/// lives and dies with one alignment call; raw labels are never
/// persisted as identity.
fn normalize_speaker_labels(mut segments: Vec<AlignedSegment>) -> Vec<AlignedSegment> {
    use std::collections::HashMap;

    let mut mapping: HashMap<String, String> = HashMap::new();
    let mut next_index = 0usize;

    for seg in &mut segments {
        if seg.speaker_id == UNKNOWN_SPEAKER {
            continue;
        }
        let label = mapping.entry(seg.speaker_id.clone()).or_insert_with(|| {
            if is_canonical_label(&seg.speaker_id) {
                seg.speaker_id.clone()
            } else {
                let label = canonical_label(next_index);
                next_index += 1;
                label
            }
        });
        seg.speaker_id = label.clone();
    }

    segments
}

fn is_canonical_label(label: &str) -> bool {
    match label.strip_prefix("Speaker ") {
        Some(rest) => rest.len() == 1 && rest.chars().all(|c| c.is_ascii_uppercase()),
        None => false,
    }
}

fn canonical_label(index: usize) -> String {
    if index < 26 {
        format!("Speaker {}", (b'A' + index as u8) as char)
    } else {
        format!("Speaker {}", index + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AlignmentConfig {
        AlignmentConfig::default()
    }

    fn diar(spans: &[(&str, f64, f64)]) -> Vec<DiarizationSegment> {
        spans
            .iter()
            .map(|(s, a, b)| DiarizationSegment {
                speaker: s.to_string(),
                start: *a,
                end: *b,
            })
            .collect()
    }

    fn joined_words(segments: &[AlignedSegment]) -> Vec<String> {
        segments
            .iter()
            .flat_map(|s| s.text.split_whitespace().map(str::to_string))
            .collect()
    }

    #[test]
    fn empty_diarization_yields_single_default_segment() {
        let out = align_transcript(
            &Transcript::plain("hello from the committee"),
            &[],
            120.0,
            &cfg(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].speaker_id, "Speaker A");
        assert_eq!(out[0].start, 0.0);
        assert_eq!(out[0].end, 120.0);
    }

    #[test]
    fn proportional_allocation_preserves_every_word() {
        let text: String = (0..100)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let diarization = diar(&[
            ("SPEAKER_00", 0.0, 30.0),
            ("SPEAKER_01", 30.0, 37.0),
            ("SPEAKER_00", 37.0, 90.0),
        ]);

        let out = align_transcript(&Transcript::plain(&text), &diarization, 90.0, &cfg());

        let expected: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        assert_eq!(joined_words(&out), expected);
    }

    #[test]
    fn output_is_sorted_and_non_overlapping() {
        let text: String = (0..200)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let diarization = diar(&[
            ("a", 0.0, 20.0),
            ("b", 19.0, 40.0),
            ("a", 41.0, 60.0),
            ("c", 60.0, 75.0),
        ]);

        let out = align_transcript(&Transcript::plain(&text), &diarization, 75.0, &cfg());

        for pair in out.windows(2) {
            assert!(pair[0].start <= pair[1].start);
            assert!(pair[0].end <= pair[1].start + 1e-9);
        }
    }

    #[test]
    fn consecutive_same_speaker_segments_collapse() {
        let text: String = (0..60)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let diarization = diar(&[
            ("SPEAKER_00", 0.0, 15.0),
            ("SPEAKER_00", 15.0, 30.0),
            ("SPEAKER_01", 30.0, 60.0),
        ]);

        let out = align_transcript(&Transcript::plain(&text), &diarization, 60.0, &cfg());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].speaker_id, "Speaker A");
        assert_eq!(out[1].speaker_id, "Speaker B");
    }

    #[test]
    fn short_segments_fold_into_predecessor_and_degrade_confidence() {
        let words = vec![
            TimedWord {
                text: "one".into(),
                at: 0.5,
            },
            TimedWord {
                text: "two".into(),
                at: 1.0,
            },
            // Nine words for the first speaker so it survives the fold.
        ];
        let mut all = words;
        for i in 0..8 {
            all.push(TimedWord {
                text: format!("w{i}"),
                at: 1.5 + i as f64 * 0.2,
            });
        }
        // A three-word interjection from a second speaker.
        for (i, w) in ["brief", "short", "reply"].iter().enumerate() {
            all.push(TimedWord {
                text: w.to_string(),
                at: 10.0 + i as f64 * 0.2,
            });
        }

        let diarization = diar(&[("x", 0.0, 9.0), ("y", 9.5, 11.0)]);
        let transcript = Transcript {
            text: String::new(),
            words: Some(all),
        };

        let out = align_transcript(&transcript, &diarization, 11.0, &cfg());

        assert_eq!(out.len(), 1);
        assert!(out[0].text.ends_with("brief short reply"));
        assert_eq!(out[0].confidence, Confidence::Medium);
    }

    #[test]
    fn time_lookup_uses_gap_tolerance_then_unknown() {
        let diarization = diar(&[("x", 0.0, 5.0), ("y", 20.0, 25.0)]);

        // 6.0 is 1.0s past x's end: within tolerance.
        let (speaker, exact) = speaker_at(6.0, &diarization, 2.0);
        assert_eq!(speaker, "x");
        assert!(!exact);

        // 12.0 is 7.0s from x and 8.0s from y: unknown.
        let (speaker, _) = speaker_at(12.0, &diarization, 2.0);
        assert_eq!(speaker, UNKNOWN_SPEAKER);
    }

    #[test]
    fn canonical_labels_are_kept_and_new_ones_assigned_in_order() {
        let text: String = (0..40)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let diarization = diar(&[
            ("Speaker B", 0.0, 20.0),
            ("SPEAKER_07", 20.0, 40.0),
        ]);

        let out = align_transcript(&Transcript::plain(&text), &diarization, 40.0, &cfg());

        assert_eq!(out[0].speaker_id, "Speaker B");
        assert_eq!(out[1].speaker_id, "Speaker A");
    }
}
