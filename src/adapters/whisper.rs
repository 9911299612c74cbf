//! Whisper transcription fallback.
//!
//! Shells out to a local whisper binary when no usable caption track
//! exists. Output is requested as JSON so segment timing survives.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::transcript::TranscriptSegment;

use super::{FallbackTranscript, SpeechTranscriber, TranscribeError};

/// Local whisper subprocess transcriber
pub struct WhisperTranscriber {
    /// Path to the whisper binary (default: "whisper", override with WHISPER_PATH)
    binary_path: String,

    /// Model size (tiny, base, small, medium, large-v3)
    model: String,
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
}

impl WhisperTranscriber {
    pub fn new(model: impl Into<String>) -> Self {
        let binary_path =
            std::env::var("WHISPER_PATH").unwrap_or_else(|_| "whisper".to_string());

        Self {
            binary_path,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SpeechTranscriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<FallbackTranscript, TranscribeError> {
        let temp_dir = tempfile::tempdir()?;

        tracing::info!(model = %self.model, audio = %audio_path.display(), "Transcribing with whisper");

        let output = Command::new(&self.binary_path)
            .arg(audio_path)
            .args(["--model", &self.model])
            .arg("--output_dir")
            .arg(temp_dir.path())
            .args(["--output_format", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscribeError::Model(stderr.trim().to_string()));
        }

        // Whisper writes <stem>.json next to nothing else we asked for
        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| TranscribeError::Output(format!("missing output file: {}", e)))?;

        let parsed: WhisperOutput = serde_json::from_str(&json_content)
            .map_err(|e| TranscribeError::Output(e.to_string()))?;

        let segments: Vec<TranscriptSegment> = parsed
            .segments
            .into_iter()
            .filter_map(|s| {
                let text = s.text.trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(TranscriptSegment {
                        start: s.start,
                        end: s.end,
                        text,
                    })
                }
            })
            .collect();

        let language = if parsed.language.is_empty() {
            None
        } else {
            Some(parsed.language)
        };

        tracing::info!(
            count = segments.len(),
            language = language.as_deref().unwrap_or("unknown"),
            "Whisper transcription complete"
        );

        Ok(FallbackTranscript { segments, language })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_output_parsing() {
        let json = r#"{
            "text": " hello world",
            "language": "en",
            "segments": [
                {"start": 0.0, "end": 2.5, "text": " hello "},
                {"start": 2.5, "end": 4.0, "text": "world"},
                {"start": 4.0, "end": 4.5, "text": "   "}
            ]
        }"#;

        let parsed: WhisperOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.language, "en");
        assert_eq!(parsed.segments.len(), 3);
        assert_eq!(parsed.segments[0].text.trim(), "hello");
    }
}
