//! Artifact rendering: one folder per processed video, holding the
//! Markdown note (YAML frontmatter + summary + transcript) and a copy of
//! the audio.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::domain::{Analysis, DownloadedAsset};

const AUDIO_FILENAME: &str = "audio.mp3";
const MAX_TITLE_LENGTH: usize = 50;

/// A rendered note folder
#[derive(Debug, Clone)]
pub struct RenderedNote {
    pub folder_path: PathBuf,
    pub folder_name: String,
    pub note_path: PathBuf,
}

/// Renders analysis results into note folders under the outbox
pub struct NoteRenderer {
    outbox_dir: PathBuf,
}

impl NoteRenderer {
    pub fn new(outbox_dir: impl Into<PathBuf>) -> Self {
        Self {
            outbox_dir: outbox_dir.into(),
        }
    }

    /// Create the note folder, write the Markdown note and copy the
    /// audio asset into it.
    pub async fn create_note(
        &self,
        url: &str,
        asset: &DownloadedAsset,
        analysis: &Analysis,
        transcript: &str,
    ) -> Result<RenderedNote> {
        let safe_title = sanitize_filename(&analysis.title);

        let today = Local::now().format("%Y-%m-%d");
        let folder_path = ensure_unique_path(self.outbox_dir.join(format!("{}_{}", today, safe_title)));
        let folder_name = folder_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        tokio::fs::create_dir_all(&folder_path)
            .await
            .with_context(|| format!("Failed to create note folder: {}", folder_path.display()))?;

        let markdown = generate_markdown(url, asset, analysis, transcript);
        let note_path = folder_path.join(format!("{}.md", safe_title));
        tokio::fs::write(&note_path, markdown)
            .await
            .with_context(|| format!("Failed to write note: {}", note_path.display()))?;

        let audio_dest = folder_path.join(AUDIO_FILENAME);
        tokio::fs::copy(&asset.audio_path, &audio_dest)
            .await
            .with_context(|| format!("Failed to copy audio to: {}", audio_dest.display()))?;

        tracing::info!(note = %note_path.display(), "Created note");

        Ok(RenderedNote {
            folder_path,
            folder_name,
            note_path,
        })
    }
}

fn generate_markdown(
    url: &str,
    asset: &DownloadedAsset,
    analysis: &Analysis,
    transcript: &str,
) -> String {
    let frontmatter = build_frontmatter(url, asset, analysis);
    let takeaways = format_takeaways(&analysis.key_takeaways);
    let topics = format_topics(&analysis.topics);

    format!(
        "{frontmatter}\n\n\
         # {title}\n\n\
         ## AI Summary\n\n\
         {summary}\n\n\
         ### Key Takeaways\n\n\
         {takeaways}\n\
         {topics}\
         ---\n\n\
         ## Audio\n\n\
         ![[{audio}]]\n\n\
         ---\n\n\
         ## Full Transcript\n\n\
         {transcript}\n",
        frontmatter = frontmatter,
        title = analysis.title,
        summary = analysis.summary,
        takeaways = takeaways,
        topics = topics,
        audio = AUDIO_FILENAME,
        transcript = transcript,
    )
}

fn build_frontmatter(url: &str, asset: &DownloadedAsset, analysis: &Analysis) -> String {
    let processed_date = Local::now().format("%Y-%m-%d").to_string();
    let upload_date = format_upload_date(asset.upload_date.as_deref());
    let duration = clock_duration(asset.duration_secs);

    let tags_yaml = analysis
        .tags
        .iter()
        .map(|tag| format!("  - {}", tag.name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "---\n\
         title: \"{title}\"\n\
         channel: \"{channel}\"\n\
         url: \"{url}\"\n\
         upload_date: {upload_date}\n\
         duration: \"{duration}\"\n\
         tags:\n{tags}\n\
         processed_date: {processed}\n\
         ---",
        title = escape_yaml(&analysis.title),
        channel = escape_yaml(&asset.channel),
        url = url,
        upload_date = upload_date,
        duration = duration,
        tags = tags_yaml,
        processed = processed_date,
    )
}

fn format_takeaways(takeaways: &[String]) -> String {
    if takeaways.is_empty() {
        return "* No key takeaways extracted.".to_string();
    }

    takeaways
        .iter()
        .map(|t| format!("* {}", t))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_topics(topics: &[String]) -> String {
    if topics.is_empty() {
        return String::new();
    }

    format!("\n### Topics Covered\n\n{}\n\n", topics.join(", "))
}

/// YYYYMMDD -> YYYY-MM-DD, passing anything else through
fn format_upload_date(upload_date: Option<&str>) -> String {
    match upload_date {
        Some(date) if date.len() == 8 => {
            format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
        }
        Some(date) => date.to_string(),
        None => "Unknown".to_string(),
    }
}

/// Duration as a clock string: "1:02:03" or "4:05"
fn clock_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "Unknown".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn escape_yaml(text: &str) -> String {
    text.replace('"', "\\\"")
}

/// Sanitize a title for use as a file name
fn sanitize_filename(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();

    sanitized = sanitized.split_whitespace().collect::<Vec<_>>().join("_");

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }
    sanitized = sanitized.trim_matches('_').to_string();

    if sanitized.chars().count() > MAX_TITLE_LENGTH {
        sanitized = sanitized.chars().take(MAX_TITLE_LENGTH).collect();
        sanitized = sanitized.trim_end_matches('_').to_string();
    }

    if sanitized.is_empty() {
        sanitized = "Untitled".to_string();
    }

    sanitized
}

/// Make a folder path unique by suffixing a counter, falling back to a
/// timestamp past 100 collisions.
fn ensure_unique_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let base_name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    let parent = path.parent().unwrap_or(Path::new(".")).to_path_buf();

    for counter in 1..=100 {
        let candidate = parent.join(format!("{}_{}", base_name, counter));
        if !candidate.exists() {
            return candidate;
        }
    }

    let timestamp = Local::now().format("%H%M%S");
    parent.join(format!("{}_{}", base_name, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Analysis, Tag};
    use tempfile::TempDir;

    fn asset(temp: &TempDir) -> DownloadedAsset {
        let audio_path = temp.path().join("vid.mp3");
        std::fs::write(&audio_path, b"fake audio").unwrap();

        DownloadedAsset {
            video_id: "abcdefghijk".to_string(),
            title: "Raw Title".to_string(),
            channel: "The \"Best\" Channel".to_string(),
            duration_secs: 3723,
            upload_date: Some("20260114".to_string()),
            thumbnail_url: None,
            description: None,
            audio_path,
            caption_path: None,
            caption_source: None,
        }
    }

    fn analysis() -> Analysis {
        Analysis {
            title: "Clean Title: A Story?".to_string(),
            summary: "Two paragraphs of summary.".to_string(),
            key_takeaways: vec!["First".to_string(), "Second".to_string()],
            tags: vec![
                Tag {
                    name: "education".to_string(),
                    confidence: 90,
                    primary: true,
                },
                Tag {
                    name: "science".to_string(),
                    confidence: 60,
                    primary: false,
                },
            ],
            topics: vec!["ownership".to_string(), "lifetimes".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_note_writes_markdown_and_audio() {
        let temp = TempDir::new().unwrap();
        let outbox = temp.path().join("outbox");
        let renderer = NoteRenderer::new(&outbox);

        let rendered = renderer
            .create_note(
                "https://www.youtube.com/watch?v=abcdefghijk",
                &asset(&temp),
                &analysis(),
                "(00:00) transcript text",
            )
            .await
            .unwrap();

        assert!(rendered.note_path.exists());
        assert!(rendered.folder_path.join(AUDIO_FILENAME).exists());
        assert!(rendered.folder_name.contains("Clean_Title_A_Story"));

        let content = std::fs::read_to_string(&rendered.note_path).unwrap();
        assert!(content.starts_with("---\ntitle: \"Clean Title: A Story?\""));
        assert!(content.contains("channel: \"The \\\"Best\\\" Channel\""));
        assert!(content.contains("upload_date: 2026-01-14"));
        assert!(content.contains("duration: \"1:02:03\""));
        assert!(content.contains("  - education\n  - science"));
        assert!(content.contains("* First\n* Second"));
        assert!(content.contains("### Topics Covered\n\nownership, lifetimes"));
        assert!(content.contains("![[audio.mp3]]"));
        assert!(content.contains("(00:00) transcript text"));
    }

    #[tokio::test]
    async fn test_colliding_folders_get_counter_suffix() {
        let temp = TempDir::new().unwrap();
        let outbox = temp.path().join("outbox");
        let renderer = NoteRenderer::new(&outbox);

        let first = renderer
            .create_note("url", &asset(&temp), &analysis(), "t")
            .await
            .unwrap();
        let second = renderer
            .create_note("url", &asset(&temp), &analysis(), "t")
            .await
            .unwrap();

        assert_ne!(first.folder_name, second.folder_name);
        assert!(second.folder_name.ends_with("_1"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("A/B:C?*D"), "ABCD");
        assert_eq!(sanitize_filename("  spaces   between  "), "spaces_between");
        assert_eq!(sanitize_filename("***"), "Untitled");

        let long = "x".repeat(80);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_TITLE_LENGTH);
    }

    #[test]
    fn test_clock_duration() {
        assert_eq!(clock_duration(0), "Unknown");
        assert_eq!(clock_duration(65), "1:05");
        assert_eq!(clock_duration(3723), "1:02:03");
    }

    #[test]
    fn test_format_upload_date() {
        assert_eq!(format_upload_date(Some("20260114")), "2026-01-14");
        assert_eq!(format_upload_date(Some("2026")), "2026");
        assert_eq!(format_upload_date(None), "Unknown");
    }
}
