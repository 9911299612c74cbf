//! Gemini API client for transcript summarization.
//!
//! One `generateContent` call per attempt; retry policy lives in the
//! analysis engine, not here. The raw response text is returned as-is;
//! validation and repair are the caller's concern.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::format_duration;

use super::{AnalysisRequest, SummarizeError, Summarizer};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Transcripts are truncated to this many characters before prompting
const MAX_PROMPT_TRANSCRIPT_CHARS: usize = 15_000;

/// Gemini HTTP client
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        tracing::info!(%model, "Initialized Gemini client");
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        )
    }

    fn build_prompt(&self, request: &AnalysisRequest) -> String {
        let tags_str = request.allowed_tags.join(", ");
        let duration_str = format_duration(request.duration_secs);

        let transcript: String = request
            .transcript
            .chars()
            .take(MAX_PROMPT_TRANSCRIPT_CHARS)
            .collect();

        format!(
            r#"Analyze this video transcript and provide a structured summary.

VIDEO INFORMATION:
- Title: {title}
- Channel: {channel}
- Duration: {duration}

TRANSCRIPT:
{transcript}

---

Return a JSON response with:

1. "title": A clean, descriptive title for the note (use the video title as base, clean up clickbait if present, max 60 chars)

2. "summary": A 2-3 paragraph summary of the main content. Be specific about what is discussed. Write in clear, engaging prose.

3. "key_takeaways": An array of 3-5 key points or insights from the video. Each should be actionable or memorable.

4. "tags": Select 2-3 most appropriate tags from this list: [{tags}]
   Return as array with confidence scores:
   [
     {{"name": "tag_name", "confidence": 0-100, "primary": true/false}}
   ]
   Rules:
   - Mark ONE tag as primary (highest confidence)
   - Primary tag confidence should be >= 80%
   - If no tag fits well, use "uncategorized"

5. "topics": An array of 3-5 specific topics or themes discussed (these can be new, not from the tag list)

Return ONLY valid JSON, no other text."#,
            title = request.title,
            channel = request.channel,
            duration = duration_str,
            transcript = transcript,
            tags = tags_str,
        )
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(&self, request: &AnalysisRequest) -> Result<String, SummarizeError> {
        let prompt = self.build_prompt(request);

        // Transcripts trip over default safety filters; relax them
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "safetySettings": [
                { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE" }
            ]
        });

        tracing::debug!(title = %request.title, "Sending analysis request");

        let response = self.client.post(self.api_url()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Api(format!("{}: {}", status, detail)));
        }

        let parsed: GenerateResponse = response.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            // A received-but-empty response is repaired downstream,
            // not retried
            tracing::warn!(title = %request.title, "Empty response from Gemini");
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            transcript: "(00:00) hello world".to_string(),
            title: "Test Video".to_string(),
            channel: "Test Channel".to_string(),
            duration_secs: 125,
            allowed_tags: vec!["education".to_string(), "science".to_string()],
        }
    }

    #[test]
    fn test_prompt_contains_metadata_and_tags() {
        let client = GeminiClient::new("KEY".to_string(), "gemini-2.5-flash".to_string());
        let prompt = client.build_prompt(&request());

        assert!(prompt.contains("Title: Test Video"));
        assert!(prompt.contains("Channel: Test Channel"));
        assert!(prompt.contains("Duration: 2m 5s"));
        assert!(prompt.contains("[education, science]"));
    }

    #[test]
    fn test_prompt_truncates_transcript() {
        let client = GeminiClient::new("KEY".to_string(), "gemini-2.5-flash".to_string());
        let mut req = request();
        req.transcript = "x".repeat(MAX_PROMPT_TRANSCRIPT_CHARS * 2);

        let prompt = client.build_prompt(&req);
        assert!(prompt.len() < MAX_PROMPT_TRANSCRIPT_CHARS + 2_000);
    }

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{
            "candidates": [{
                "content": { "parts": [{ "text": "{\"title\":" }, { "text": " \"T\"}" }] }
            }]
        }"#;

        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        assert_eq!(text, "{\"title\": \"T\"}");
    }

    #[test]
    fn test_api_url() {
        let client = GeminiClient::new("KEY".to_string(), "gemini-2.5-flash".to_string());
        assert_eq!(
            client.api_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=KEY"
        );
    }
}
