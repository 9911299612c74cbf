//! Transcript acquisition: provider captions first, model fallback second.
//!
//! Caption tracks are parsed from WebVTT, cleaned of markup and
//! non-speech cues, then run through a merge pass that removes the
//! duplicate/overlapping text auto-generated caption streams produce as
//! captions scroll. If no caption track exists, or parsing fails, the
//! audio is transcribed with the fallback model instead; there is no
//! third tier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::{SpeechTranscriber, TranscribeError};
use crate::domain::{CaptionSource, DownloadedAsset};

#[derive(Debug, Error)]
pub enum VttError {
    #[error("caption file contains no usable cues")]
    NoCues,

    #[error("invalid cue timestamp: {0}")]
    BadTimestamp(String),
}

/// A single time-coded piece of transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    pub text: String,
}

/// Where the transcript came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    YoutubeManual,
    YoutubeAuto,
    Whisper,
}

impl std::fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptSource::YoutubeManual => write!(f, "youtube_manual"),
            TranscriptSource::YoutubeAuto => write!(f, "youtube_auto"),
            TranscriptSource::Whisper => write!(f, "whisper"),
        }
    }
}

/// An ordered, deduplicated transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub segments: Vec<TranscriptSegment>,
    pub source: TranscriptSource,
    pub language: Option<String>,
}

impl TranscriptResult {
    /// Full transcript as plain text
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Flatten to a human-readable blob with periodic `(MM:SS)` markers.
    ///
    /// A marker is inserted before the first segment whose start is at
    /// least `interval_secs` past the previous marker; the very first
    /// segment always gets one. Lossy flattening, consumed only by the
    /// analysis prompt and the rendered note.
    pub fn format_with_timestamps(&self, interval_secs: u64) -> String {
        if self.segments.is_empty() {
            return String::new();
        }

        let interval = interval_secs as f64;
        let mut parts = Vec::new();
        let mut last_marker = -interval;

        for segment in &self.segments {
            if segment.start - last_marker >= interval {
                parts.push(format!("\n({})", format_timestamp(segment.start)));
                last_marker = segment.start;
            }
            parts.push(segment.text.clone());
        }

        parts.join(" ").trim().to_string()
    }
}

/// Format seconds as MM:SS, or HH:MM:SS past the hour mark
fn format_timestamp(seconds: f64) -> String {
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Acquire a transcript for a downloaded asset.
///
/// Prefers the caption track when one exists; any caption parse failure
/// falls back to model transcription of the audio. The fallback must
/// succeed or the job fails.
pub async fn acquire(
    asset: &DownloadedAsset,
    fallback: &dyn SpeechTranscriber,
) -> Result<TranscriptResult, TranscribeError> {
    if let Some(caption_path) = &asset.caption_path {
        let source = match asset.caption_source {
            Some(CaptionSource::Manual) => TranscriptSource::YoutubeManual,
            _ => TranscriptSource::YoutubeAuto,
        };

        tracing::info!(path = %caption_path.display(), %source, "Using provider captions");

        match tokio::fs::read_to_string(caption_path).await {
            Ok(content) => match parse_vtt(&content) {
                Ok(segments) => {
                    let segments = merge_segments(segments);
                    tracing::info!(count = segments.len(), "Parsed caption segments");
                    return Ok(TranscriptResult {
                        segments,
                        source,
                        language: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Caption parse failed, falling back to whisper");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Caption file unreadable, falling back to whisper");
            }
        }
    }

    tracing::info!("Transcribing audio with fallback model");
    let output = fallback.transcribe(&asset.audio_path).await?;

    Ok(TranscriptResult {
        segments: output.segments,
        source: TranscriptSource::Whisper,
        language: output.language,
    })
}

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static pattern"));
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("static pattern"));
static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)").expect("static pattern"));

/// Strip markup tags and bracketed/parenthetical non-speech annotations
/// ("[Music]", "(applause)"), then collapse whitespace.
pub fn clean_caption_text(text: &str) -> String {
    let text = MARKUP_TAG.replace_all(text, "");
    let text = BRACKETED.replace_all(&text, "");
    let text = PARENTHESIZED.replace_all(&text, "");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a WebVTT caption file into cleaned segments (not yet merged).
///
/// Lenient about everything except cue timing lines: header, NOTE/STYLE
/// blocks and cue identifiers are skipped by only reacting to lines
/// containing `-->`. Empty-text segments are dropped after cleaning.
pub fn parse_vtt(content: &str) -> Result<Vec<TranscriptSegment>, VttError> {
    let mut segments = Vec::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        if !line.contains("-->") {
            continue;
        }

        let mut halves = line.splitn(2, "-->");
        let start_str = halves.next().unwrap_or_default().trim();
        // Cue settings (position, alignment) may follow the end time
        let end_str = halves
            .next()
            .unwrap_or_default()
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or_default();

        let start = vtt_time_to_seconds(start_str)?;
        let end = vtt_time_to_seconds(end_str)?;

        let mut text_lines = Vec::new();
        while let Some(&text_line) = lines.peek() {
            if text_line.trim().is_empty() || text_line.contains("-->") {
                break;
            }
            text_lines.push(text_line.trim());
            lines.next();
        }

        let text = clean_caption_text(&text_lines.join(" "));
        if !text.is_empty() {
            segments.push(TranscriptSegment { start, end, text });
        }
    }

    if segments.is_empty() {
        return Err(VttError::NoCues);
    }

    Ok(segments)
}

/// Convert a VTT timestamp ("HH:MM:SS.mmm" or "MM:SS.mmm", comma
/// tolerated as decimal separator) to seconds.
pub fn vtt_time_to_seconds(time_str: &str) -> Result<f64, VttError> {
    let normalized = time_str.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let bad = || VttError::BadTimestamp(time_str.to_string());

    match parts.as_slice() {
        [hours, minutes, seconds] => {
            let h: f64 = hours.parse().map_err(|_| bad())?;
            let m: f64 = minutes.parse().map_err(|_| bad())?;
            let s: f64 = seconds.parse().map_err(|_| bad())?;
            Ok(h * 3600.0 + m * 60.0 + s)
        }
        [minutes, seconds] => {
            let m: f64 = minutes.parse().map_err(|_| bad())?;
            let s: f64 = seconds.parse().map_err(|_| bad())?;
            Ok(m * 60.0 + s)
        }
        [seconds] => seconds.parse().map_err(|_| bad()),
        _ => Err(bad()),
    }
}

/// Remove duplicate and overlapping segments while preserving order.
///
/// Auto-generated caption streams repeat text as captions scroll: the
/// same line appears in consecutive cues, or a cue carries a strict
/// superset of the previous one. Pass rules, in order, per candidate:
/// exact duplicates (case-insensitive, against everything seen) are
/// skipped; a candidate that is a substring of the last accepted segment
/// is overlap noise and skipped; a candidate whose text contains the last
/// accepted segment's text replaces it (keep the more complete version);
/// anything else is appended. Idempotent on its own output.
pub fn merge_segments(segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut merged: Vec<TranscriptSegment> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();

    for segment in segments {
        let clean = segment.text.trim().to_lowercase();

        if clean.is_empty() || seen.contains(&clean) {
            continue;
        }

        if let Some(last) = merged.last_mut() {
            let last_clean = last.text.trim().to_lowercase();

            if last_clean.contains(&clean) {
                continue;
            }

            if clean.contains(&last_clean) {
                seen.remove(&last_clean);
                seen.insert(clean);
                *last = segment;
                continue;
            }
        }

        seen.insert(clean);
        merged.push(segment);
    }

    merged
}
