//! Pipeline Idempotency Integration Tests
//!
//! Exercises the orchestrator end-to-end with mock collaborators:
//! exactly-once processing, caption-preferred transcription, the whisper
//! fallback, and failure recording.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use vidnote::adapters::{
    AnalysisRequest, DownloadError, FallbackTranscript, MediaDownloader, SpeechTranscriber,
    SummarizeError, Summarizer, TranscribeError,
};
use vidnote::domain::{CaptionSource, DownloadedAsset, JobOutcome, JobRequest};
use vidnote::notifications::NotificationManager;
use vidnote::pipeline::{AnalysisEngine, JobLogWriter, JobOrchestrator};
use vidnote::render::NoteRenderer;
use vidnote::store::Ledger;
use vidnote::tags::TagCatalog;
use vidnote::transcript::TranscriptSegment;

const MANUAL_VTT: &str = "\
WEBVTT

00:00.000 --> 00:02.000
hello

00:01.000 --> 00:03.000
hello world

00:05.000 --> 00:07.000
bye
";

const ANALYSIS_JSON: &str = r#"{
    "title": "Mock Analysis Title",
    "summary": "A summary of the video.",
    "key_takeaways": ["First takeaway"],
    "tags": [{"name": "education", "confidence": 90, "primary": true}],
    "topics": ["testing"]
}"#;

struct MockDownloader {
    temp_dir: PathBuf,
    caption: Option<(&'static str, CaptionSource)>,
    fail: bool,
    fetches: AtomicU32,
}

impl MockDownloader {
    fn new(temp_dir: PathBuf, caption: Option<(&'static str, CaptionSource)>) -> Self {
        Self {
            temp_dir,
            caption,
            fail: false,
            fetches: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MediaDownloader for MockDownloader {
    async fn fetch(&self, _url: &str, video_id: &str) -> Result<DownloadedAsset, DownloadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(DownloadError::Extractor("network down".to_string()));
        }

        tokio::fs::create_dir_all(&self.temp_dir).await.unwrap();
        let audio_path = self.temp_dir.join(format!("{}.mp3", video_id));
        tokio::fs::write(&audio_path, b"fake audio bytes")
            .await
            .unwrap();

        let (caption_path, caption_source) = match &self.caption {
            Some((vtt, source)) => {
                let path = self.temp_dir.join(format!("{}.en.vtt", video_id));
                tokio::fs::write(&path, vtt).await.unwrap();
                (Some(path), Some(*source))
            }
            None => (None, None),
        };

        Ok(DownloadedAsset {
            video_id: video_id.to_string(),
            title: "Raw Video Title".to_string(),
            channel: "Mock Channel".to_string(),
            duration_secs: 125,
            upload_date: Some("20260101".to_string()),
            thumbnail_url: None,
            description: None,
            audio_path,
            caption_path,
            caption_source,
        })
    }

    async fn cleanup(&self, _video_id: &str) {}
}

struct MockTranscriber {
    calls: AtomicU32,
}

#[async_trait]
impl SpeechTranscriber for MockTranscriber {
    async fn transcribe(&self, _audio_path: &Path) -> Result<FallbackTranscript, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(FallbackTranscript {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 5.0,
                text: "whisper transcribed text".to_string(),
            }],
            language: Some("en".to_string()),
        })
    }
}

struct MockSummarizer {
    calls: AtomicU32,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, _request: &AnalysisRequest) -> Result<String, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ANALYSIS_JSON.to_string())
    }
}

struct Harness {
    orchestrator: JobOrchestrator,
    ledger: Arc<Ledger>,
    downloader: Arc<MockDownloader>,
    transcriber: Arc<MockTranscriber>,
    summarizer: Arc<MockSummarizer>,
    outbox: PathBuf,
    logs: PathBuf,
    _temp: TempDir,
}

fn harness(caption: Option<(&'static str, CaptionSource)>, download_fails: bool) -> Harness {
    let temp = TempDir::new().unwrap();
    let outbox = temp.path().join("Outbox");
    let logs = temp.path().join("Logs");

    let mut mock = MockDownloader::new(temp.path().join("temp"), caption);
    mock.fail = download_fails;
    let downloader = Arc::new(mock);
    let transcriber = Arc::new(MockTranscriber {
        calls: AtomicU32::new(0),
    });
    let summarizer = Arc::new(MockSummarizer {
        calls: AtomicU32::new(0),
    });
    let ledger = Arc::new(Ledger::in_memory().unwrap());

    let orchestrator = JobOrchestrator::new(
        downloader.clone(),
        transcriber.clone(),
        AnalysisEngine::new(summarizer.clone(), 3, Duration::from_millis(1)),
        ledger.clone(),
        Arc::new(NotificationManager::new()),
        Arc::new(TagCatalog::open(&outbox, false).unwrap()),
        NoteRenderer::new(&outbox),
        JobLogWriter::new(&logs, true),
    );

    Harness {
        orchestrator,
        ledger,
        downloader,
        transcriber,
        summarizer,
        outbox,
        logs,
        _temp: temp,
    }
}

fn job(identifier: &str) -> JobRequest {
    JobRequest::local(
        identifier.to_string(),
        "job.txt".to_string(),
        "https://www.youtube.com/watch?v=ABCDEFGHIJK".to_string(),
    )
}

fn processing_log(harness: &Harness, video_id: &str) -> serde_json::Value {
    let path = harness.logs.join(format!("{}_processing.json", video_id));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_same_identifier_processed_exactly_once() {
    let harness = harness(Some((MANUAL_VTT, CaptionSource::Manual)), false);

    let first = harness.orchestrator.process(&job("local:/inbox/a.txt")).await.unwrap();
    assert!(first.is_completed());

    let second = harness.orchestrator.process(&job("local:/inbox/a.txt")).await.unwrap();
    assert!(matches!(second, JobOutcome::Skipped));

    // The second invocation performed no download or analysis side effects
    assert_eq!(harness.downloader.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(harness.summarizer.calls.load(Ordering::SeqCst), 1);

    let record = harness.ledger.get("local:/inbox/a.txt").unwrap().unwrap();
    assert_eq!(record.status, "success");
    assert!(record.output_path.is_some());
}

#[tokio::test]
async fn test_end_to_end_with_manual_captions() {
    let harness = harness(Some((MANUAL_VTT, CaptionSource::Manual)), false);

    let outcome = harness.orchestrator.process(&job("local:/inbox/e2e.txt")).await.unwrap();

    let JobOutcome::Completed {
        folder_name,
        video_id,
        title,
    } = outcome
    else {
        panic!("expected completion");
    };

    assert_eq!(video_id, "ABCDEFGHIJK");
    assert_eq!(title, "Mock Analysis Title");

    // Artifact folder contains the rendered note and the copied audio
    let folder = harness.outbox.join(&folder_name);
    assert!(folder.join("audio.mp3").exists());
    let note = std::fs::read_to_string(folder.join("Mock_Analysis_Title.md")).unwrap();
    assert!(note.contains("## AI Summary"));
    // Caption merge collapsed the subset/superset pair
    assert!(note.contains("hello world"));
    assert!(!note.contains("hello\n"));

    // Transcript came from the manual caption track, not whisper
    let log = processing_log(&harness, "ABCDEFGHIJK");
    assert_eq!(log["transcription_source"], "youtube_manual");
    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 0);

    let record = harness.ledger.get("local:/inbox/e2e.txt").unwrap().unwrap();
    assert_eq!(record.status, "success");
}

#[tokio::test]
async fn test_whisper_fallback_without_captions() {
    let harness = harness(None, false);

    let outcome = harness.orchestrator.process(&job("local:/inbox/w.txt")).await.unwrap();
    assert!(outcome.is_completed());

    assert_eq!(harness.transcriber.calls.load(Ordering::SeqCst), 1);

    let log = processing_log(&harness, "ABCDEFGHIJK");
    assert_eq!(log["transcription_source"], "whisper");
}

#[tokio::test]
async fn test_failed_job_records_error_and_can_retry() {
    let harness = harness(Some((MANUAL_VTT, CaptionSource::Manual)), true);

    let outcome = harness.orchestrator.process(&job("local:/inbox/f.txt")).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Failed { .. }));

    let record = harness.ledger.get("local:/inbox/f.txt").unwrap().unwrap();
    assert_eq!(record.status, "error");
    assert!(record.error_message.unwrap().contains("network down"));

    // An error record does not gate re-processing
    assert!(!harness.ledger.is_processed("local:/inbox/f.txt").unwrap());
}

#[tokio::test]
async fn test_unresolvable_content_fails_before_download() {
    let harness = harness(None, false);

    let bad_job = JobRequest::local(
        "local:/inbox/bad.txt".to_string(),
        "bad.txt".to_string(),
        "# just a comment\nno url here".to_string(),
    );

    let outcome = harness.orchestrator.process(&bad_job).await.unwrap();

    assert!(matches!(outcome, JobOutcome::Failed { .. }));
    assert_eq!(harness.downloader.fetches.load(Ordering::SeqCst), 0);

    let record = harness.ledger.get("local:/inbox/bad.txt").unwrap().unwrap();
    assert_eq!(record.status, "error");
}
