//! Deterministic rendering of aligned segments into delivery formats.
//!
//! Every renderer is a pure function of the segment list; no I/O. The
//! JSON shape matches what downstream transcript players expect: a flat
//! word array with synthetic 40 ms spacing tokens between words and
//! per-word timing spread evenly across each segment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::align::{AlignedSegment, Confidence};

const SPACING_SECONDS: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Json,
    Csv,
    Txt,
    Vtt,
    Srt,
}

impl ArtifactFormat {
    pub fn all() -> &'static [ArtifactFormat] {
        &[
            ArtifactFormat::Json,
            ArtifactFormat::Csv,
            ArtifactFormat::Txt,
            ArtifactFormat::Vtt,
            ArtifactFormat::Srt,
        ]
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Txt => "txt",
            ArtifactFormat::Vtt => "vtt",
            ArtifactFormat::Srt => "srt",
        }
    }
}

impl std::fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One rendered transcript artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub format: ArtifactFormat,
    pub content: String,
}

/// Render every delivery format at once.
pub fn render_all(segments: &[AlignedSegment]) -> Vec<Artifact> {
    ArtifactFormat::all()
        .iter()
        .map(|&format| Artifact {
            format,
            content: match format {
                ArtifactFormat::Json => to_json(segments),
                ArtifactFormat::Csv => to_csv(segments),
                ArtifactFormat::Txt => to_txt(segments),
                ArtifactFormat::Vtt => to_vtt(segments),
                ArtifactFormat::Srt => to_srt(segments),
            },
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonTranscript {
    text: String,
    words: Vec<WordToken>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WordToken {
    text: String,
    #[serde(rename = "type")]
    kind: String,
    start: f64,
    end: f64,
    speaker_id: String,
}

/// JSON with per-word timing evenly distributed inside each segment and
/// spacing tokens between words (never after a segment's last word).
pub fn to_json(segments: &[AlignedSegment]) -> String {
    let text = segments
        .iter()
        .map(|s| s.text.trim())
        .collect::<Vec<_>>()
        .join(" ");

    let mut words = Vec::new();
    for segment in segments {
        let segment_words: Vec<&str> = segment.text.split_whitespace().collect();
        if segment_words.is_empty() {
            continue;
        }

        let time_per_word = (segment.end - segment.start) / segment_words.len() as f64;
        let mut current = segment.start;

        for (i, word) in segment_words.iter().enumerate() {
            let word_end = current + time_per_word;
            words.push(WordToken {
                text: word.to_string(),
                kind: "word".to_string(),
                start: round2(current),
                end: round2(word_end),
                speaker_id: segment.speaker_id.clone(),
            });

            if i < segment_words.len() - 1 {
                words.push(WordToken {
                    text: " ".to_string(),
                    kind: "spacing".to_string(),
                    start: round2(word_end),
                    end: round2(word_end + SPACING_SECONDS),
                    speaker_id: segment.speaker_id.clone(),
                });
            }

            current = word_end;
        }
    }

    let transcript = JsonTranscript { text, words };
    serde_json::to_string_pretty(&transcript).expect("transcript serialization")
}

/// CSV with one row per segment. The timestamp column carries the
/// `HH:MM:SS - HH:MM:SS` range so `parse_csv` can reconstruct both
/// endpoints.
pub fn to_csv(segments: &[AlignedSegment]) -> String {
    let mut out = String::from("timestamp,speaker,text\n");
    for segment in segments {
        let timestamp = format!(
            "{} - {}",
            format_timestamp(segment.start),
            format_timestamp(segment.end)
        );
        out.push_str(&csv_field(&timestamp));
        out.push(',');
        out.push_str(&csv_field(&segment.speaker_id));
        out.push(',');
        out.push_str(&csv_field(segment.text.trim()));
        out.push('\n');
    }
    out
}

/// Reverse of [`to_csv`]. Timestamps come back whole-second.
pub fn parse_csv(content: &str) -> Result<Vec<AlignedSegment>> {
    let mut rows = split_csv_rows(content)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    // Drop the header.
    rows.remove(0);

    let mut segments = Vec::with_capacity(rows.len());
    for row in rows {
        if row.len() != 3 {
            bail!("Expected 3 CSV columns, got {}", row.len());
        }
        let (start, end) = parse_timestamp_range(&row[0])
            .with_context(|| format!("Bad timestamp column: {}", row[0]))?;
        segments.push(AlignedSegment {
            speaker_id: row[1].clone(),
            text: row[2].clone(),
            start,
            end,
            confidence: Confidence::Medium,
            reason: "parsed from csv".to_string(),
        });
    }
    Ok(segments)
}

/// Speaker-delimited plain text: `HH:MM:SS | Speaker A | text`.
pub fn to_txt(segments: &[AlignedSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            format!(
                "{} | {} | {}",
                format_timestamp(segment.start),
                segment.speaker_id,
                segment.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// WebVTT cue list. Fractional seconds use the `.` separator.
pub fn to_vtt(segments: &[AlignedSegment]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}: {}\n\n",
            i + 1,
            format_cue_timestamp(segment.start, '.'),
            format_cue_timestamp(segment.end, '.'),
            segment.speaker_id,
            segment.text.trim()
        ));
    }
    out
}

/// SubRip cue list. Fractional seconds use the `,` separator.
pub fn to_srt(segments: &[AlignedSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}: {}\n\n",
            i + 1,
            format_cue_timestamp(segment.start, ','),
            format_cue_timestamp(segment.end, ','),
            segment.speaker_id,
            segment.text.trim()
        ));
    }
    out
}

pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn format_cue_timestamp(seconds: f64, separator: char) -> String {
    let clamped = seconds.max(0.0);
    let total = clamped as u64;
    let millis = ((clamped - total as f64) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        total / 3600,
        (total % 3600) / 60,
        total % 60,
        separator,
        millis.min(999)
    )
}

fn parse_timestamp_range(field: &str) -> Result<(f64, f64)> {
    let (start, end) = field
        .split_once(" - ")
        .context("Timestamp range missing ' - ' separator")?;
    Ok((parse_timestamp(start)?, parse_timestamp(end)?))
}

fn parse_timestamp(value: &str) -> Result<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let seconds = match parts.as_slice() {
        [h, m, s] => {
            h.parse::<u64>()? * 3600 + m.parse::<u64>()? * 60 + s.parse::<u64>()?
        }
        [m, s] => m.parse::<u64>()? * 60 + s.parse::<u64>()?,
        _ => bail!("Unrecognized timestamp: {value}"),
    };
    Ok(seconds as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Minimal RFC-4180 row splitter matching what [`csv_field`] emits.
fn split_csv_rows(content: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        bail!("Unterminated quoted CSV field");
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(speaker: &str, start: f64, end: f64, text: &str) -> AlignedSegment {
        AlignedSegment {
            speaker_id: speaker.to_string(),
            text: text.to_string(),
            start,
            end,
            confidence: Confidence::High,
            reason: "test".to_string(),
        }
    }

    fn sample() -> Vec<AlignedSegment> {
        vec![
            seg("Speaker A", 5.0, 11.0, "Good morning everyone, welcome to the hearing"),
            seg("Speaker B", 18.0, 24.0, "Thank you Mr. Chairman, I have two questions"),
            seg("Speaker A", 165.0, 167.0, "Please proceed"),
        ]
    }

    #[test]
    fn json_words_cover_text_with_spacing_tokens() {
        let segments = vec![seg("Speaker A", 0.0, 4.0, "one two three four")];
        let json = to_json(&segments);
        let parsed: JsonTranscript = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.text, "one two three four");
        // 4 words + 3 spacing tokens.
        assert_eq!(parsed.words.len(), 7);
        assert_eq!(parsed.words[0].kind, "word");
        assert_eq!(parsed.words[1].kind, "spacing");
        assert_eq!(parsed.words[0].start, 0.0);
        assert_eq!(parsed.words[0].end, 1.0);
        assert_eq!(parsed.words[1].end, 1.04);
        // Last token is a word, not spacing.
        assert_eq!(parsed.words.last().unwrap().kind, "word");
        assert_eq!(parsed.words.last().unwrap().end, 4.0);
    }

    #[test]
    fn csv_round_trips_whole_second_segments() {
        let segments = sample();
        let parsed = parse_csv(&to_csv(&segments)).unwrap();

        assert_eq!(parsed.len(), segments.len());
        for (a, b) in segments.iter().zip(&parsed) {
            assert_eq!(a.speaker_id, b.speaker_id);
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.text, b.text);
        }
    }

    #[test]
    fn csv_quotes_commas_and_embedded_quotes() {
        let segments = vec![seg(
            "Speaker A",
            0.0,
            2.0,
            "Yes, the \"special\" appropriation, as amended",
        )];
        let csv = to_csv(&segments);
        assert!(csv.contains("\"Yes, the \"\"special\"\" appropriation, as amended\""));

        let parsed = parse_csv(&csv).unwrap();
        assert_eq!(parsed[0].text, "Yes, the \"special\" appropriation, as amended");
    }

    #[test]
    fn txt_uses_pipe_delimiters() {
        let txt = to_txt(&sample());
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "00:00:05 | Speaker A | Good morning everyone, welcome to the hearing"
        );
        assert_eq!(lines[2], "00:02:45 | Speaker A | Please proceed");
    }

    #[test]
    fn vtt_and_srt_use_their_decimal_separators() {
        let segments = vec![seg("Speaker A", 0.0, 2.5, "Order please")];

        let vtt = to_vtt(&segments);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:02.500"));
        assert!(vtt.contains("Speaker A: Order please"));

        let srt = to_srt(&segments);
        assert!(srt.starts_with("1\n"));
        assert!(srt.contains("00:00:00,000 --> 00:00:02,500"));
    }

    #[test]
    fn all_formats_carry_the_same_segment_count() {
        let segments = sample();
        let artifacts = render_all(&segments);
        assert_eq!(artifacts.len(), 5);

        for artifact in &artifacts {
            let count = match artifact.format {
                ArtifactFormat::Json => {
                    let parsed: JsonTranscript =
                        serde_json::from_str(&artifact.content).unwrap();
                    let mut speakers_in_order = Vec::new();
                    for token in parsed.words.iter().filter(|w| w.kind == "word") {
                        if speakers_in_order.last() != Some(&token.speaker_id) {
                            speakers_in_order.push(token.speaker_id.clone());
                        }
                    }
                    speakers_in_order.len()
                }
                ArtifactFormat::Csv => parse_csv(&artifact.content).unwrap().len(),
                ArtifactFormat::Txt => artifact.content.lines().count(),
                ArtifactFormat::Vtt => artifact.content.matches(" --> ").count(),
                ArtifactFormat::Srt => artifact.content.matches(" --> ").count(),
            };
            assert_eq!(count, segments.len(), "format {}", artifact.format);
        }
    }

    #[test]
    fn timestamp_formatting_handles_hours() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(59.9), "00:00:59");
        assert_eq!(format_timestamp(3661.0), "01:01:01");
    }
}
