//! Adapter interfaces for external collaborators.
//!
//! The pipeline talks to its network-backed collaborators (media
//! extraction, model transcription, summarization) through these traits
//! so the orchestrator can be exercised end-to-end with mocks.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::DownloadedAsset;
use crate::transcript::TranscriptSegment;

pub mod gemini;
pub mod whisper;
pub mod ytdlp;

pub use gemini::GeminiClient;
pub use whisper::WhisperTranscriber;
pub use ytdlp::YtDlpDownloader;

/// Errors from the media download collaborator
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to spawn extractor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("extractor failed: {0}")]
    Extractor(String),

    #[error("failed to parse extractor metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("audio file not found after download for {0}")]
    MissingAudio(String),
}

/// Errors from the transcription fallback collaborator
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("failed to spawn transcription model: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("transcription model failed: {0}")]
    Model(String),

    #[error("failed to parse model output: {0}")]
    Output(String),
}

/// Errors from the summarization collaborator. All variants are
/// treated as transient by the retry engine.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarization request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("summarization service error: {0}")]
    Api(String),
}

/// Downloads audio, captions and metadata for a resolved video
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Fetch the audio asset (and caption track, if available) for a
    /// canonical URL. Files land in the downloader's temp directory.
    async fn fetch(&self, url: &str, video_id: &str) -> Result<DownloadedAsset, DownloadError>;

    /// Best-effort removal of temp files for a video
    async fn cleanup(&self, video_id: &str);
}

/// Segments produced by the model fallback
#[derive(Debug, Clone)]
pub struct FallbackTranscript {
    pub segments: Vec<TranscriptSegment>,
    pub language: Option<String>,
}

/// Model-based transcription of an audio file
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<FallbackTranscript, TranscribeError>;
}

/// Input to one summarization call
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Timestamp-formatted transcript text
    pub transcript: String,
    pub title: String,
    pub channel: String,
    pub duration_secs: u64,

    /// Closed vocabulary the model must choose tags from
    pub allowed_tags: Vec<String>,
}

/// Calls the summarization service once. Returns the raw response text;
/// validation and repair happen in the analysis engine.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &AnalysisRequest) -> Result<String, SummarizeError>;
}
