//! Heuristic speaker-turn detection over caption timing.
//!
//! Used when no diarization engine ran: the only signals are the gaps
//! between caption cues and the phrasing of the cue text. The decision
//! ladder is an ordered rule list evaluated top-to-bottom with
//! short-circuit, so each rule stays auditable and testable on its own.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{AlignedSegment, Confidence};
use crate::config::TurnsConfig;

/// One caption cue from the external caption source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionSegment {
    pub begin: f64,
    pub end: f64,
    pub text: String,
}

/// A maximal run of captions attributed to one speaker.
#[derive(Debug, Clone)]
pub struct Turn {
    /// 1-based detection-order identifier.
    pub speaker_id: usize,
    /// `Speaker N`, or a name extracted from a self-introduction.
    pub speaker_label: String,
    pub captions: Vec<CaptionSegment>,
    pub confidence: Confidence,
    pub reason: String,
}

impl Turn {
    pub fn start(&self) -> f64 {
        self.captions.first().map_or(0.0, |c| c.begin)
    }

    pub fn end(&self) -> f64 {
        self.captions.last().map_or(0.0, |c| c.end)
    }

    pub fn text(&self) -> String {
        self.captions
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn word_count(&self) -> usize {
        self.captions
            .iter()
            .map(|c| c.text.split_whitespace().count())
            .sum()
    }
}

/// Outcome of one matched rule.
#[derive(Debug, Clone)]
struct Decision {
    confidence: Confidence,
    reason: String,
}

struct Rule {
    name: &'static str,
    eval: Box<dyn Fn(f64, &str) -> Option<Decision> + Send + Sync>,
}

pub struct TurnSegmenter {
    config: TurnsConfig,
    rules: Vec<Rule>,
    name_patterns: Vec<Regex>,
}

impl TurnSegmenter {
    pub fn new(config: TurnsConfig) -> Self {
        let strong = compile(&[
            r"(?is)^(thank you.*?)\.\s+(good morning|good afternoon|good evening|my name)",
            r"(?is)^(good morning|good afternoon|good evening).*?(madam chair|chair|committee)",
            r"(?i)^my name is \w+",
            r"(?is)^(thank you.*?)\.\s+(next|moving on|now)",
            r"(?is)(thank you.*?)\.\s*$",
        ]);
        let moderate = compile(&[
            r"(?is)^(uh|um|well|so|now|ok|okay|alright|all right).*?my name",
            r"(?i)^(yes|no),?\s+(madam|mr\.|ms\.|mrs\.)",
            r"(?is)question.*?\?$",
            r"(?i)^(thank you|thanks?)\.?\s",
        ]);
        let greeting = Regex::new(r"(?i)^(good morning|good afternoon|good evening)")
            .expect("greeting pattern");
        let thanks = Regex::new(r"(?i)^(thank you|thanks)").expect("thanks pattern");

        let name_patterns = compile(&[
            r"(?i)my name(?:\s+is|'s)?\s+(\w+(?:\s+\w+){0,2})",
            r"(?i)\bi'?m (\w+(?:\s+\w+){0,2})",
            r"(?i)\bthis is (\w+(?:\s+\w+){0,2})",
        ]);

        let major = config.major_pause_seconds;
        let moderate_pause = config.moderate_pause_seconds;
        let minor = config.minor_pause_seconds;

        let strong_a = strong.clone();
        let strong_b = strong.clone();
        let moderate_a = moderate;

        let rules = vec![
            Rule {
                name: "major pause",
                eval: Box::new(move |pause, _| {
                    (pause >= major).then(|| Decision {
                        confidence: Confidence::High,
                        reason: format!("major pause ({pause:.1}s)"),
                    })
                }),
            },
            Rule {
                name: "pause + strong pattern",
                eval: Box::new(move |pause, text| {
                    (pause >= 1.0 && matches_any(&strong_a, text)).then(|| Decision {
                        confidence: Confidence::High,
                        reason: format!("pause ({pause:.1}s) + strong speech pattern"),
                    })
                }),
            },
            Rule {
                name: "moderate pause",
                eval: Box::new(move |pause, text| {
                    (pause >= moderate_pause).then(|| {
                        if matches_any(&moderate_a, text) {
                            Decision {
                                confidence: Confidence::High,
                                reason: format!(
                                    "moderate pause ({pause:.1}s) + moderate speech pattern"
                                ),
                            }
                        } else {
                            Decision {
                                confidence: Confidence::Medium,
                                reason: format!("moderate pause ({pause:.1}s)"),
                            }
                        }
                    })
                }),
            },
            Rule {
                name: "strong pattern",
                eval: Box::new(move |_, text| {
                    matches_any(&strong_b, text).then(|| Decision {
                        confidence: Confidence::High,
                        reason: "strong speech pattern".to_string(),
                    })
                }),
            },
            Rule {
                name: "minor pause + opener",
                eval: Box::new(move |pause, text| {
                    if pause < minor {
                        return None;
                    }
                    if greeting.is_match(text) {
                        return Some(Decision {
                            confidence: Confidence::Medium,
                            reason: format!("minor pause ({pause:.1}s) + formal greeting"),
                        });
                    }
                    if thanks.is_match(text) {
                        return Some(Decision {
                            confidence: Confidence::Medium,
                            reason: format!("minor pause ({pause:.1}s) + thank you transition"),
                        });
                    }
                    None
                }),
            },
        ];

        Self {
            config,
            rules,
            name_patterns,
        }
    }

    /// Split a caption stream into speaker turns.
    ///
    /// Deterministic: identical captions and thresholds always produce
    /// identical output.
    pub fn segment(&self, captions: &[CaptionSegment]) -> Vec<Turn> {
        let Some(first) = captions.first() else {
            return Vec::new();
        };

        let mut turns = Vec::new();
        let mut speaker_count = 1usize;

        turns.push(Turn {
            speaker_id: speaker_count,
            speaker_label: self
                .extract_speaker_name(&first.text)
                .unwrap_or_else(|| format!("Speaker {speaker_count}")),
            captions: vec![first.clone()],
            confidence: Confidence::High,
            reason: "session start".to_string(),
        });

        for pair in captions.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let pause = curr.begin - prev.end;

            match self.classify(pause, curr.text.trim()) {
                Some((rule, decision)) => {
                    debug!(rule, pause, "speaker change");
                    speaker_count += 1;
                    turns.push(Turn {
                        speaker_id: speaker_count,
                        speaker_label: self
                            .extract_speaker_name(&curr.text)
                            .unwrap_or_else(|| format!("Speaker {speaker_count}")),
                        captions: vec![curr.clone()],
                        confidence: decision.confidence,
                        reason: decision.reason,
                    });
                }
                None => {
                    turns
                        .last_mut()
                        .expect("first turn exists")
                        .captions
                        .push(curr.clone());
                }
            }
        }

        self.merge_short_turns(turns)
    }

    /// First matching rule wins.
    fn classify(&self, pause: f64, text: &str) -> Option<(&'static str, Decision)> {
        self.rules
            .iter()
            .find_map(|rule| (rule.eval)(pause, text).map(|d| (rule.name, d)))
    }

    /// Fold turns under the word threshold into their predecessor.
    fn merge_short_turns(&self, turns: Vec<Turn>) -> Vec<Turn> {
        let mut merged: Vec<Turn> = Vec::with_capacity(turns.len());

        for turn in turns {
            match merged.last_mut() {
                Some(prev) if turn.word_count() < self.config.min_words => {
                    let absorbed_high = turn.confidence == Confidence::High;
                    prev.captions.extend(turn.captions);
                    if absorbed_high && prev.confidence != Confidence::High {
                        prev.confidence = Confidence::Medium;
                    }
                }
                _ => merged.push(turn),
            }
        }

        merged
    }

    /// Pull a name out of a self-introduction, filtering words that show
    /// up in those phrasings but are not names.
    fn extract_speaker_name(&self, text: &str) -> Option<String> {
        const NOT_NAMES: &[&str] = &["the", "a", "an", "here", "going", "gonna", "speaking"];

        for pattern in &self.name_patterns {
            if let Some(captures) = pattern.captures(text) {
                let candidate = captures.get(1)?.as_str().trim();
                let first_word = candidate.split_whitespace().next()?.to_lowercase();
                if NOT_NAMES.contains(&first_word.as_str()) {
                    continue;
                }
                return Some(title_case(candidate));
            }
        }

        None
    }
}

/// Render detected turns as aligned segments so the serializers can
/// consume caption-only output unchanged.
pub fn turns_to_segments(turns: &[Turn]) -> Vec<AlignedSegment> {
    turns
        .iter()
        .map(|turn| AlignedSegment {
            speaker_id: turn.speaker_label.clone(),
            text: turn.text(),
            start: turn.start(),
            end: turn.end(),
            confidence: turn.confidence,
            reason: turn.reason.clone(),
        })
        .collect()
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("turn pattern"))
        .collect()
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
