//! Domain types for the vidnote pipeline.
//!
//! This module contains the core data structures:
//! - Job: One unit of work per submitted video reference
//! - Video: Resolved references and downloaded assets
//! - Analysis: Validated summarization results

pub mod analysis;
pub mod job;
pub mod video;

// Re-export commonly used types
pub use analysis::{Analysis, Tag, FALLBACK_TAG};
pub use job::{JobOutcome, JobRequest, JobSource};
pub use video::{format_duration, CaptionSource, DownloadedAsset, VideoReference};
