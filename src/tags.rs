//! Tag vocabulary management.
//!
//! The closed vocabulary handed to the summarizer comes from a
//! user-editable `tags.txt` in the outbox, optionally enriched by tags
//! found in the frontmatter of notes already produced. `uncategorized`
//! is always present as the repair fallback.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::FALLBACK_TAG;

/// Seed vocabulary written to a fresh tags.txt
pub const DEFAULT_TAGS: &[&str] = &[
    "education",
    "tutorial",
    "podcast",
    "interview",
    "documentary",
    "entertainment",
    "technology",
    "science",
    "business",
    "health",
    "fitness",
    "meditation",
    "music",
    "cooking",
    "travel",
    "news",
    "review",
    "howto",
    "motivation",
    "finance",
];

/// Names that can never be user tags
const RESERVED: &[&str] = &[FALLBACK_TAG, "logs", "archive", "inbox", "outbox", "temp"];

static FRONTMATTER_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tags:\s*\n((?:\s+-\s+\w+\n?)+)").expect("static pattern"));
static TAG_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\s+(\w+)").expect("static pattern"));
static VALID_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("static pattern"));

/// Tag vocabulary backed by tags.txt plus learned tags
pub struct TagCatalog {
    outbox_dir: PathBuf,
    tags_file: PathBuf,
    enable_learning: bool,
}

impl TagCatalog {
    /// Open the catalog, seeding tags.txt with defaults if absent
    pub fn open(outbox_dir: impl Into<PathBuf>, enable_learning: bool) -> Result<Self> {
        let outbox_dir = outbox_dir.into();
        std::fs::create_dir_all(&outbox_dir)
            .with_context(|| format!("Failed to create outbox: {}", outbox_dir.display()))?;

        let tags_file = outbox_dir.join("tags.txt");
        if !tags_file.exists() {
            std::fs::write(&tags_file, DEFAULT_TAGS.join("\n"))
                .with_context(|| format!("Failed to seed tags file: {}", tags_file.display()))?;
            tracing::info!(count = DEFAULT_TAGS.len(), "Created default tags.txt");
        }

        Ok(Self {
            outbox_dir,
            tags_file,
            enable_learning,
        })
    }

    /// Validate a tag name: lowercase alphanumeric with hyphens and
    /// underscores, 2-30 chars, not a reserved name.
    pub fn is_valid_tag(tag: &str) -> bool {
        if tag.len() < 2 || tag.len() > 30 {
            return false;
        }
        if !VALID_TAG.is_match(tag) {
            return false;
        }
        !RESERVED.contains(&tag)
    }

    fn tags_from_file(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();

        let content = match std::fs::read_to_string(&self.tags_file) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read tags.txt");
                return tags;
            }
        };

        for line in content.lines() {
            let tag = line.trim().to_lowercase();
            if !tag.is_empty() && Self::is_valid_tag(&tag) {
                tags.insert(tag);
            }
        }

        tags
    }

    /// Learn tags from the YAML frontmatter of existing notes
    fn tags_from_notes(&self) -> BTreeSet<String> {
        let mut learned = BTreeSet::new();

        if !self.enable_learning {
            return learned;
        }

        let entries = match std::fs::read_dir(&self.outbox_dir) {
            Ok(entries) => entries,
            Err(_) => return learned,
        };

        for entry in entries.flatten() {
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }

            let notes = match std::fs::read_dir(&folder) {
                Ok(notes) => notes,
                Err(_) => continue,
            };

            for note in notes.flatten() {
                let path = note.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }

                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };

                // Only the frontmatter region matters
                let head: String = content.chars().take(2000).collect();
                if !head.starts_with("---") {
                    continue;
                }

                if let Some(captures) = FRONTMATTER_TAGS.captures(&head) {
                    for tag_match in TAG_LINE.captures_iter(&captures[1]) {
                        let tag = tag_match[1].to_lowercase();
                        if Self::is_valid_tag(&tag) {
                            learned.insert(tag);
                        }
                    }
                }
            }
        }

        if !learned.is_empty() {
            tracing::debug!(count = learned.len(), "Learned tags from existing notes");
        }

        learned
    }

    /// The full vocabulary: file tags, learned tags, and the fallback
    pub fn available_tags(&self) -> Vec<String> {
        let mut all = self.tags_from_file();
        all.extend(self.tags_from_notes());
        all.insert(FALLBACK_TAG.to_string());

        all.into_iter().collect()
    }

    /// Append a new tag to tags.txt. Returns false for invalid names.
    pub fn add_tag(&self, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_lowercase();

        if !Self::is_valid_tag(&tag) {
            tracing::warn!(%tag, "Rejected invalid tag name");
            return Ok(false);
        }

        if self.tags_from_file().contains(&tag) {
            return Ok(true);
        }

        let mut content = std::fs::read_to_string(&self.tags_file).unwrap_or_default();
        if !content.ends_with('\n') && !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&tag);
        std::fs::write(&self.tags_file, content)
            .with_context(|| format!("Failed to update tags file: {}", self.tags_file.display()))?;

        tracing::info!(%tag, "Added tag to tags.txt");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_seeds_defaults_and_includes_fallback() {
        let temp = TempDir::new().unwrap();
        let catalog = TagCatalog::open(temp.path(), false).unwrap();

        let tags = catalog.available_tags();
        assert!(tags.contains(&"education".to_string()));
        assert!(tags.contains(&FALLBACK_TAG.to_string()));
        assert_eq!(tags.len(), DEFAULT_TAGS.len() + 1);
    }

    #[test]
    fn test_tag_validation() {
        assert!(TagCatalog::is_valid_tag("machine-learning"));
        assert!(TagCatalog::is_valid_tag("web3"));
        assert!(!TagCatalog::is_valid_tag("a"));
        assert!(!TagCatalog::is_valid_tag("Has Spaces"));
        assert!(!TagCatalog::is_valid_tag("UPPER"));
        assert!(!TagCatalog::is_valid_tag("uncategorized"));
        assert!(!TagCatalog::is_valid_tag("inbox"));
    }

    #[test]
    fn test_learns_tags_from_note_frontmatter() {
        let temp = TempDir::new().unwrap();
        let note_dir = temp.path().join("2026-01-01_Some_Note");
        std::fs::create_dir_all(&note_dir).unwrap();
        std::fs::write(
            note_dir.join("Some_Note.md"),
            "---\ntitle: \"T\"\ntags:\n  - astronomy\n  - rocketry\n---\n# T\n",
        )
        .unwrap();

        let catalog = TagCatalog::open(temp.path(), true).unwrap();
        let tags = catalog.available_tags();

        assert!(tags.contains(&"astronomy".to_string()));
        assert!(tags.contains(&"rocketry".to_string()));
    }

    #[test]
    fn test_add_tag() {
        let temp = TempDir::new().unwrap();
        let catalog = TagCatalog::open(temp.path(), false).unwrap();

        assert!(catalog.add_tag("astronomy").unwrap());
        assert!(catalog.available_tags().contains(&"astronomy".to_string()));

        // Idempotent
        assert!(catalog.add_tag("astronomy").unwrap());
        // Invalid rejected
        assert!(!catalog.add_tag("NOT VALID").unwrap());
    }
}
