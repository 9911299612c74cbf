//! YouTube URL resolution.
//!
//! Extracts an 11-character video id from the many URL shapes YouTube
//! serves (watch pages, short links, embeds, shorts, live, mobile) and
//! normalizes everything to the canonical watch URL, so downstream keying
//! is insensitive to which flavor the job file contained.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::domain::VideoReference;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no video reference found in job content")]
    NoReferenceFound,
}

/// Recognized URL shapes. Each must yield an 11-character id.
static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Standard watch URLs: youtube.com/watch?v=VIDEO_ID
        r"(?:https?://)?(?:www\.)?youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})",
        // Short URLs: youtu.be/VIDEO_ID
        r"(?:https?://)?youtu\.be/([a-zA-Z0-9_-]{11})",
        // Embed URLs: youtube.com/embed/VIDEO_ID
        r"(?:https?://)?(?:www\.)?youtube\.com/embed/([a-zA-Z0-9_-]{11})",
        // Shorts URLs: youtube.com/shorts/VIDEO_ID
        r"(?:https?://)?(?:www\.)?youtube\.com/shorts/([a-zA-Z0-9_-]{11})",
        // Live URLs: youtube.com/live/VIDEO_ID
        r"(?:https?://)?(?:www\.)?youtube\.com/live/([a-zA-Z0-9_-]{11})",
        // Mobile URLs: m.youtube.com/watch?v=VIDEO_ID
        r"(?:https?://)?m\.youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static EMBEDDED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("static pattern"));

/// Extract a video id from a URL in any supported shape
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    for pattern in URL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(input) {
            let video_id = captures[1].to_string();
            tracing::debug!(%video_id, "Extracted video id");
            return Some(video_id);
        }
    }

    // Fallback: a youtube host with an 11-char `v` query parameter in an
    // otherwise unrecognized shape (extra params before v=, etc.)
    if let Ok(parsed) = Url::parse(input) {
        let host = parsed.host_str().unwrap_or_default();
        if host.contains("youtube.com") || host.contains("youtu.be") {
            if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
                if v.len() == 11 {
                    return Some(v.to_string());
                }
            }
        }
    }

    None
}

/// Normalize any supported URL shape to the canonical watch URL
pub fn normalize_url(input: &str) -> Option<VideoReference> {
    extract_video_id(input).map(VideoReference::from_id)
}

/// Resolve the first video reference from job-file content.
///
/// Blank lines and `#` comments are skipped. Each remaining line is tried
/// as a whole; if that fails, the first embedded http(s) substring in the
/// line is retried (covers "check this out: https://..." forms).
pub fn resolve_job_content(content: &str) -> Result<VideoReference, ResolveError> {
    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(video) = normalize_url(line) {
            return Ok(video);
        }

        if let Some(found) = EMBEDDED_URL.find(line) {
            if let Some(video) = normalize_url(found.as_str()) {
                return Ok(video);
            }
        }
    }

    tracing::warn!("No valid video URL found in job content");
    Err(ResolveError::NoReferenceFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_all_shapes() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
        ];

        for case in cases {
            assert_eq!(
                extract_video_id(case).as_deref(),
                Some("dQw4w9WgXcQ"),
                "failed for {}",
                case
            );
        }
    }

    #[test]
    fn test_extract_query_param_fallback() {
        let url = "https://www.youtube.com/watch?feature=shared&v=dQw4w9WgXcQ";
        assert_eq!(extract_video_id(url).as_deref(), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_rejects_non_video_urls() {
        assert!(extract_video_id("https://example.com/watch?v=dQw4w9WgXcQ").is_none());
        assert!(extract_video_id("https://youtu.be/short").is_none());
        assert!(extract_video_id("not a url at all").is_none());
    }

    #[test]
    fn test_normalize_emits_canonical_form() {
        let video = normalize_url("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(video.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(video.video_id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_resolve_embedded_url() {
        let content = "check this out: https://youtu.be/dQw4w9WgXcQ";
        let video = resolve_job_content(content).unwrap();
        assert_eq!(video.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_resolve_skips_comments_and_blanks() {
        let content = "# https://youtu.be/dQw4w9WgXcQ\n\nhttps://youtu.be/abcdefghijk";
        let video = resolve_job_content(content).unwrap();
        assert_eq!(video.video_id, "abcdefghijk");
    }

    #[test]
    fn test_resolve_first_valid_line_wins() {
        let content = "some notes here\nhttps://youtu.be/abcdefghijk\nhttps://youtu.be/AAAAAAAAAAA";
        let video = resolve_job_content(content).unwrap();
        assert_eq!(video.video_id, "abcdefghijk");
    }

    #[test]
    fn test_resolve_no_reference() {
        let err = resolve_job_content("# only a comment\n\nplain text").unwrap_err();
        assert!(matches!(err, ResolveError::NoReferenceFound));
    }
}
