//! Job orchestration.
//!
//! Sequences resolve -> download -> transcribe -> analyze -> assemble,
//! then records the outcome in the ledger, notifies, and cleans up temp
//! assets. Every stage failure is caught at this boundary: logged with
//! context, recorded as an error, notified, cleaned up. Nothing escapes
//! to crash a watcher for a single job's failure. The exception is a
//! ledger write failure, which breaks the exactly-once guarantee and
//! must propagate.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::adapters::{
    AnalysisRequest, DownloadError, MediaDownloader, SpeechTranscriber, TranscribeError,
};
use crate::domain::{DownloadedAsset, JobOutcome, JobRequest, VideoReference};
use crate::notifications::{NotificationManager, SuccessNotification};
use crate::render::{NoteRenderer, RenderedNote};
use crate::resolve::{self, ResolveError};
use crate::store::{JobStatus, Ledger, LedgerRecord};
use crate::tags::TagCatalog;
use crate::transcript::{self, TranscriptSource};

use super::analyzer::{AnalysisEngine, AnalysisError};
use super::joblog::JobLogWriter;

/// Interval between timestamp markers in the formatted transcript
const TIMESTAMP_INTERVAL_SECS: u64 = 60;

/// Pipeline stage names, for logs and error records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Download,
    Transcribe,
    Analyze,
    Assemble,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
            Stage::Assemble => "assemble",
        };
        write!(f, "{}", name)
    }
}

/// A stage failure. Each variant is a first-class transition to the
/// failed state, not an unwind.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscribeError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to assemble artifact: {0}")]
    Assembly(String),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Resolve(_) => Stage::Resolve,
            StageError::Download(_) => Stage::Download,
            StageError::Transcription(_) => Stage::Transcribe,
            StageError::Analysis(_) => Stage::Analyze,
            StageError::Assembly(_) => Stage::Assemble,
        }
    }
}

/// What the stages produced on success
struct StageOutput {
    video: VideoReference,
    asset: DownloadedAsset,
    transcript_source: TranscriptSource,
    analysis: crate::domain::Analysis,
    rendered: RenderedNote,
}

/// Partial progress captured for failure handling (which video to
/// clean up, which URL to name in the notification)
#[derive(Default)]
struct FailureContext {
    video_id: Option<String>,
    url: Option<String>,
}

/// Sequences the pipeline for one job at a time
pub struct JobOrchestrator {
    downloader: Arc<dyn MediaDownloader>,
    transcriber: Arc<dyn SpeechTranscriber>,
    analyzer: AnalysisEngine,
    ledger: Arc<Ledger>,
    notifier: Arc<NotificationManager>,
    tags: Arc<TagCatalog>,
    renderer: NoteRenderer,
    joblog: JobLogWriter,
}

impl JobOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        downloader: Arc<dyn MediaDownloader>,
        transcriber: Arc<dyn SpeechTranscriber>,
        analyzer: AnalysisEngine,
        ledger: Arc<Ledger>,
        notifier: Arc<NotificationManager>,
        tags: Arc<TagCatalog>,
        renderer: NoteRenderer,
        joblog: JobLogWriter,
    ) -> Self {
        Self {
            downloader,
            transcriber,
            analyzer,
            ledger,
            notifier,
            tags,
            renderer,
            joblog,
        }
    }

    /// Process one job end-to-end.
    ///
    /// Returns `Ok` for every per-job outcome, including stage failures
    /// (those are recorded and notified here). `Err` means the ledger
    /// itself could not be read or written.
    #[instrument(skip(self, job), fields(identifier = %job.identifier))]
    pub async fn process(&self, job: &JobRequest) -> Result<JobOutcome> {
        let started = Instant::now();

        if self
            .ledger
            .is_processed(&job.identifier)
            .context("Ledger check failed")?
        {
            info!(file = %job.file_name, "Job already processed, skipping");
            return Ok(JobOutcome::Skipped);
        }

        let mut ctx = FailureContext::default();

        match self.run_stages(job, &mut ctx).await {
            Ok(output) => self.complete_job(job, output, started).await,
            Err(stage_error) => self.fail_job(job, stage_error, ctx).await,
        }
    }

    async fn run_stages(
        &self,
        job: &JobRequest,
        ctx: &mut FailureContext,
    ) -> Result<StageOutput, StageError> {
        let video = resolve::resolve_job_content(&job.content)?;
        ctx.video_id = Some(video.video_id.clone());
        ctx.url = Some(video.url.clone());

        info!(video_id = %video.video_id, url = %video.url, "Processing video");

        let download_started = Instant::now();
        let asset = self.downloader.fetch(&video.url, &video.video_id).await?;
        self.joblog
            .download(
                &video.url,
                &asset,
                download_started.elapsed().as_millis() as u64,
            )
            .await;

        let transcript = transcript::acquire(&asset, self.transcriber.as_ref()).await?;
        let formatted = transcript.format_with_timestamps(TIMESTAMP_INTERVAL_SECS);

        let available_tags = self.tags.available_tags();
        let request = AnalysisRequest {
            transcript: formatted.clone(),
            title: asset.title.clone(),
            channel: asset.channel.clone(),
            duration_secs: asset.duration_secs,
            allowed_tags: available_tags.clone(),
        };
        let analysis = self.analyzer.analyze(&request).await?;
        self.joblog
            .analysis(
                &video.video_id,
                &analysis,
                &available_tags,
                formatted.chars().count(),
            )
            .await;

        let rendered = self
            .renderer
            .create_note(&video.url, &asset, &analysis, &formatted)
            .await
            .map_err(|e| StageError::Assembly(e.to_string()))?;

        Ok(StageOutput {
            video,
            asset,
            transcript_source: transcript.source,
            analysis,
            rendered,
        })
    }

    async fn complete_job(
        &self,
        job: &JobRequest,
        output: StageOutput,
        started: Instant,
    ) -> Result<JobOutcome> {
        self.ledger
            .mark_processed(&LedgerRecord {
                identifier: job.identifier.clone(),
                status: JobStatus::Success,
                hash: Some(hash_content(&job.content)),
                account_id: job.account_id.clone(),
                error_message: None,
                output_path: Some(output.rendered.folder_path.display().to_string()),
            })
            .context("Failed to record job success")?;

        let total_ms = started.elapsed().as_millis() as u64;
        let tag_names = output.analysis.tag_names();

        self.joblog
            .processing(
                &output.video.video_id,
                &job.file_name,
                &output.rendered.folder_name,
                total_ms,
                "success",
                &output.transcript_source.to_string(),
                &tag_names,
            )
            .await;

        self.notifier
            .notify_success(&SuccessNotification {
                title: &output.analysis.title,
                channel: &output.asset.channel,
                duration_secs: output.asset.duration_secs,
                output_folder: &output.rendered.folder_name,
                tags: &output.analysis.tags,
                transcript_source: output.transcript_source.to_string(),
                summary_excerpt: &output.analysis.summary,
                account: job.account_label(),
            })
            .await;

        self.downloader.cleanup(&output.video.video_id).await;

        info!(
            title = %output.analysis.title,
            folder = %output.rendered.folder_name,
            total_secs = total_ms / 1000,
            "Job complete"
        );

        Ok(JobOutcome::Completed {
            folder_name: output.rendered.folder_name,
            video_id: output.video.video_id,
            title: output.analysis.title,
        })
    }

    async fn fail_job(
        &self,
        job: &JobRequest,
        stage_error: StageError,
        ctx: FailureContext,
    ) -> Result<JobOutcome> {
        let stage = stage_error.stage();
        let message = stage_error.to_string();

        error!(%stage, error = %message, file = %job.file_name, "Job failed");

        if let Some(video_id) = &ctx.video_id {
            self.joblog
                .error(video_id, &stage.to_string(), &message, &job.file_name)
                .await;
        }

        self.ledger
            .mark_processed(&LedgerRecord {
                identifier: job.identifier.clone(),
                status: JobStatus::Error,
                hash: None,
                account_id: job.account_id.clone(),
                error_message: Some(message.clone()),
                output_path: None,
            })
            .context("Failed to record job failure")?;

        let url = ctx
            .url
            .unwrap_or_else(|| job.content.chars().take(100).collect());
        self.notifier
            .notify_error(
                ctx.video_id.as_deref().unwrap_or("unknown"),
                &url,
                &message,
                job.account_label(),
            )
            .await;

        if let Some(video_id) = &ctx.video_id {
            self.downloader.cleanup(video_id).await;
        }

        Ok(JobOutcome::Failed { error: message })
    }
}

/// Check whether a path looks like a job file (.txt)
pub fn is_job_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Content hash stored in the ledger, for duplicate detection
/// (first 12 hex chars of SHA256)
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_is_job_file() {
        assert!(is_job_file(&PathBuf::from("/inbox/job.txt")));
        assert!(is_job_file(&PathBuf::from("/inbox/JOB.TXT")));
        assert!(!is_job_file(&PathBuf::from("/inbox/note.md")));
        assert!(!is_job_file(&PathBuf::from("/inbox/noext")));
    }

    #[test]
    fn test_hash_content_is_stable() {
        let a = hash_content("https://youtu.be/abc");
        let b = hash_content("https://youtu.be/abc");
        let c = hash_content("https://youtu.be/xyz");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn test_stage_error_maps_to_stage() {
        let err = StageError::Assembly("disk full".to_string());
        assert_eq!(err.stage(), Stage::Assemble);
        assert_eq!(err.stage().to_string(), "assemble");

        let err: StageError = ResolveError::NoReferenceFound.into();
        assert_eq!(err.stage(), Stage::Resolve);
    }
}
