//! Per-job JSON processing logs.
//!
//! One small JSON file per event under the logs directory, keyed by
//! video id. Everything here is best-effort: a log write failure is
//! warned about and otherwise ignored.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;

use crate::domain::{Analysis, DownloadedAsset};

/// Writes per-video processing logs as JSON files
pub struct JobLogWriter {
    logs_dir: PathBuf,
    enabled: bool,
}

impl JobLogWriter {
    pub fn new(logs_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            enabled,
        }
    }

    async fn write(&self, filename: String, value: serde_json::Value) {
        if !self.enabled {
            return;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.logs_dir).await {
            tracing::warn!(error = %e, "Could not create logs directory");
            return;
        }

        let path = self.logs_dir.join(filename);
        let content = match serde_json::to_string_pretty(&value) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize log record");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&path, content).await {
            tracing::warn!(path = %path.display(), error = %e, "Could not write log record");
        } else {
            tracing::debug!(path = %path.display(), "Wrote log record");
        }
    }

    pub async fn download(&self, url: &str, asset: &DownloadedAsset, duration_ms: u64) {
        self.write(
            format!("{}_download.json", asset.video_id),
            json!({
                "video_id": asset.video_id,
                "url": url,
                "title": asset.title,
                "channel": asset.channel,
                "duration_seconds": asset.duration_secs,
                "caption_source": asset.caption_source.map(|s| s.to_string()),
                "download_duration_ms": duration_ms,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    }

    pub async fn analysis(
        &self,
        video_id: &str,
        analysis: &Analysis,
        available_tags: &[String],
        transcript_chars: usize,
    ) {
        self.write(
            format!("{}_analysis.json", video_id),
            json!({
                "video_id": video_id,
                "analysis": analysis,
                "available_tags": available_tags,
                "transcript_length": transcript_chars,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn processing(
        &self,
        video_id: &str,
        input_filename: &str,
        output_folder: &str,
        duration_ms: u64,
        status: &str,
        transcript_source: &str,
        tags: &[&str],
    ) {
        self.write(
            format!("{}_processing.json", video_id),
            json!({
                "video_id": video_id,
                "input_filename": input_filename,
                "output_folder": output_folder,
                "processing_duration_ms": duration_ms,
                "status": status,
                "transcription_source": transcript_source,
                "selected_tags": tags,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    }

    pub async fn error(&self, video_id: &str, stage: &str, message: &str, job_file: &str) {
        self.write(
            format!("{}_error.json", video_id),
            json!({
                "video_id": video_id,
                "stage": stage,
                "error_message": message,
                "job_file": job_file,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_disabled_writer_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let writer = JobLogWriter::new(temp.path().join("logs"), false);

        writer.error("vid", "download", "boom", "job.txt").await;

        assert!(!temp.path().join("logs").exists());
    }

    #[tokio::test]
    async fn test_error_log_written() {
        let temp = TempDir::new().unwrap();
        let writer = JobLogWriter::new(temp.path().join("logs"), true);

        writer.error("vid", "download", "boom", "job.txt").await;

        let content =
            std::fs::read_to_string(temp.path().join("logs").join("vid_error.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["stage"], "download");
        assert_eq!(parsed["error_message"], "boom");
    }
}
