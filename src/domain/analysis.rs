//! Structured analysis results and the raw-response repair boundary.
//!
//! The summarization service returns JSON of uneven quality: fenced in
//! markdown, missing fields, malformed tag lists. Everything that crosses
//! into the rest of the pipeline goes through [`Analysis::repair`], which
//! turns an untrusted raw response into a validated structure with
//! documented defaults for every required field.

use serde::{Deserialize, Serialize};

pub const FALLBACK_TAG: &str = "uncategorized";

const DEFAULT_TITLE: &str = "Untitled Video";
const DEFAULT_SUMMARY: &str = "No summary available.";
const DEFAULT_TAKEAWAY: &str = "No key takeaways extracted.";

/// A content tag with model-reported confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,

    /// 0-100
    pub confidence: u8,

    /// Exactly one tag is primary whenever the list is non-empty
    #[serde(default)]
    pub primary: bool,
}

impl Tag {
    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_TAG.to_string(),
            confidence: 100,
            primary: true,
        }
    }
}

/// Validated analysis of one video transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub title: String,
    pub summary: String,
    pub key_takeaways: Vec<String>,
    pub tags: Vec<Tag>,
    pub topics: Vec<String>,
}

/// Raw response shape before validation. All fields optional; serde
/// failures on the tag list degrade to None rather than failing the parse.
#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    title: Option<String>,
    summary: Option<String>,
    key_takeaways: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_tags")]
    tags: Option<Vec<Tag>>,
    topics: Option<Vec<String>>,
}

/// Accept the tags field even when individual entries are malformed,
/// keeping only the well-formed ones.
fn lenient_tags<'de, D>(deserializer: D) -> Result<Option<Vec<Tag>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    }))
}

impl Analysis {
    /// Repair a raw service response into a validated analysis.
    ///
    /// Strips surrounding code fences, parses as JSON, substitutes the
    /// documented default for each missing field, and normalizes the tag
    /// list (non-empty, exactly one primary). An unparseable response
    /// yields the full fallback rather than an error: a transcript
    /// summarized badly beats no summary, as long as the service actually
    /// answered.
    pub fn repair(response_text: &str, fallback_title: &str) -> Self {
        let stripped = strip_code_fences(response_text);

        let raw: RawAnalysis = match serde_json::from_str(stripped) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse analysis response, using fallback");
                return Self::fallback(fallback_title);
            }
        };

        let mut tags = raw.tags.unwrap_or_default();
        if tags.is_empty() {
            tags = vec![Tag::fallback()];
        }
        if !tags.iter().any(|t| t.primary) {
            tags[0].primary = true;
        }

        Self {
            title: raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            summary: raw.summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            key_takeaways: raw
                .key_takeaways
                .unwrap_or_else(|| vec![DEFAULT_TAKEAWAY.to_string()]),
            tags,
            topics: raw.topics.unwrap_or_default(),
        }
    }

    /// Full fallback when the response could not be parsed at all
    pub fn fallback(title: &str) -> Self {
        Self {
            title: title.to_string(),
            summary: "Unable to generate summary.".to_string(),
            key_takeaways: vec!["Summary generation failed.".to_string()],
            tags: vec![Tag::fallback()],
            topics: Vec::new(),
        }
    }

    /// Tag names in order
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Strip surrounding markdown code-fence markup if present
fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();

    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }

    s.trim()
}
