//! Chunked transcription of long recordings.
//!
//! Very long audio is pre-split into overlapping time windows (the
//! splitting itself is an external concern; this module receives the
//! chunk files) and transcribed by a bounded worker pool. A failed chunk
//! is dropped with a warning; the surviving texts merge in start-time
//! order with boundary-word deduplication to absorb the overlap.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::align::Transcript;
use crate::config::ChunkConfig;
use crate::engines::Transcriber;

/// One pre-split slice of the recording.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub path: PathBuf,
}

/// Cuts an audio file into the planned windows. The actual cutting
/// (ffmpeg or similar) is an external concern behind this trait.
#[async_trait]
pub trait AudioSlicer: Send + Sync {
    async fn slice(&self, audio_path: &Path, windows: &[(f64, f64)]) -> Result<Vec<AudioChunk>>;
}

/// Overlapping `(start, end)` windows covering `duration` seconds.
pub fn plan_windows(duration: f64, config: &ChunkConfig) -> Vec<(f64, f64)> {
    if duration <= config.window_seconds {
        return vec![(0.0, duration.max(0.0))];
    }

    let step = (config.window_seconds - config.overlap_seconds).max(1.0);
    let mut windows = Vec::new();
    let mut start = 0.0;

    while start < duration {
        let end = (start + config.window_seconds).min(duration);
        windows.push((start, end));
        if end >= duration {
            break;
        }
        start += step;
    }

    windows
}

/// Transcribe chunks through a bounded worker pool and merge the
/// results. Chunk failures are isolated; only a fully-failed set is an
/// error.
pub async fn transcribe_chunks(
    transcriber: Arc<Transcriber>,
    chunks: Vec<AudioChunk>,
    config: &ChunkConfig,
) -> Result<Transcript> {
    if chunks.is_empty() {
        bail!("No audio chunks to transcribe");
    }

    let total = chunks.len();
    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut tasks = JoinSet::new();

    for chunk in chunks {
        let transcriber = Arc::clone(&transcriber);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.expect("semaphore open");
            let result = transcriber.transcribe(&chunk.path).await;
            (chunk, result)
        });
    }

    let mut texts: BTreeMap<usize, String> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (chunk, result) = joined.expect("chunk task not cancelled");
        match result {
            Ok(transcript) => {
                texts.insert(chunk.index, transcript.text);
            }
            Err(err) => {
                warn!(
                    "Chunk {} ({:.0}s-{:.0}s) failed, dropping its text: {}",
                    chunk.index, chunk.start, chunk.end, err
                );
            }
        }
    }

    if texts.is_empty() {
        bail!("All {total} chunks failed to transcribe");
    }

    info!("Merged {}/{} chunk transcriptions", texts.len(), total);

    let ordered: Vec<String> = texts.into_values().collect();
    Ok(Transcript::plain(merge_chunk_texts(&ordered)))
}

/// Join chunk texts in order, dropping a duplicated word pair across
/// each boundary (the overlap usually re-transcribes the last word or
/// two of the previous window).
pub fn merge_chunk_texts(texts: &[String]) -> String {
    let mut merged: Vec<String> = Vec::new();

    for text in texts {
        let mut words: Vec<&str> = text.split_whitespace().collect();

        for _ in 0..2 {
            match (merged.last(), words.first()) {
                (Some(prev), Some(first))
                    if prev.eq_ignore_ascii_case(first) && first.len() >= 2 =>
                {
                    words.remove(0);
                }
                _ => break,
            }
        }

        merged.extend(words.into_iter().map(str::to_string));
    }

    merged.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::test_support::ScriptedEngine;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cfg(window: f64, overlap: f64, workers: usize) -> ChunkConfig {
        ChunkConfig {
            window_seconds: window,
            overlap_seconds: overlap,
            workers,
        }
    }

    #[test]
    fn short_audio_is_one_window() {
        let windows = plan_windows(120.0, &cfg(600.0, 5.0, 2));
        assert_eq!(windows, vec![(0.0, 120.0)]);
    }

    #[test]
    fn long_audio_windows_overlap_and_cover() {
        let windows = plan_windows(1500.0, &cfg(600.0, 5.0, 2));

        assert_eq!(windows[0], (0.0, 600.0));
        assert_eq!(windows[1].0, 595.0);
        assert_eq!(windows.last().unwrap().1, 1500.0);
        for pair in windows.windows(2) {
            assert!(pair[1].0 < pair[0].1, "windows must overlap");
        }
    }

    #[test]
    fn boundary_words_are_deduplicated() {
        let texts = vec![
            "the committee will now hear testimony".to_string(),
            "testimony from the public on the bill".to_string(),
        ];
        assert_eq!(
            merge_chunk_texts(&texts),
            "the committee will now hear testimony from the public on the bill"
        );
    }

    #[test]
    fn non_overlapping_boundaries_are_left_alone() {
        let texts = vec!["first part".to_string(), "second part".to_string()];
        assert_eq!(merge_chunk_texts(&texts), "first part second part");
    }

    /// Fails for any path containing "bad".
    struct PathSensitiveEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl crate::engines::TranscriptionEngine for PathSensitiveEngine {
        fn name(&self) -> &'static str {
            "path-sensitive"
        }

        async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = audio_path.to_string_lossy();
            if name.contains("bad") {
                bail!("decoder error");
            }
            Ok(Transcript::plain(format!("text for {}", name)))
        }
    }

    fn chunk(index: usize, name: &str) -> AudioChunk {
        AudioChunk {
            index,
            start: index as f64 * 600.0,
            end: (index + 1) as f64 * 600.0,
            path: PathBuf::from(name),
        }
    }

    #[tokio::test]
    async fn failed_chunk_is_dropped_and_rest_merge_in_order() {
        let transcriber = Arc::new(Transcriber::new(
            Box::new(PathSensitiveEngine {
                calls: AtomicUsize::new(0),
            }),
            None,
        ));

        let chunks = vec![chunk(0, "a.wav"), chunk(1, "bad.wav"), chunk(2, "c.wav")];
        let transcript = transcribe_chunks(transcriber, chunks, &cfg(600.0, 5.0, 2))
            .await
            .unwrap();

        assert_eq!(transcript.text, "text for a.wav text for c.wav");
    }

    #[tokio::test]
    async fn all_chunks_failing_is_an_error() {
        let transcriber = Arc::new(Transcriber::new(
            Box::new(ScriptedEngine::failing("primary")),
            None,
        ));

        let chunks = vec![chunk(0, "a.wav"), chunk(1, "b.wav")];
        let result = transcribe_chunks(transcriber, chunks, &cfg(600.0, 5.0, 2)).await;

        assert!(result.is_err());
    }
}
