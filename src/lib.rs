//! vidnote - video knowledge pipeline
//!
//! Turns text files containing video URLs into summarized Markdown
//! knowledge notes, exactly once per submitted job.
//!
//! # Architecture
//!
//! Jobs flow one direction:
//! - A watcher (local filesystem events or remote cursor-based polling)
//!   detects a job file and hands it to the orchestrator
//! - The orchestrator resolves the URL, downloads audio and captions,
//!   acquires a transcript (captions preferred, whisper fallback),
//!   summarizes it with retries, and renders the note folder
//! - The idempotency ledger records exactly one terminal outcome per
//!   job identifier and gates re-processing
//!
//! # Modules
//!
//! - `resolve`: URL shape recognition and canonicalization
//! - `transcript`: caption parsing, merge/dedup, model fallback
//! - `pipeline`: orchestrator, analysis retry engine, processing logs
//! - `store`: idempotency ledger (SQLite) and credential store
//! - `watch`: local and remote job sources
//! - `adapters`: yt-dlp, whisper and Gemini collaborators
//! - `dropbox`: remote filesystem client and OAuth flow
//! - `notifications`: Telegram and email notification providers
//!
//! # Usage
//!
//! ```bash
//! # Watch the local inbox
//! vidnote watch
//!
//! # Poll authorized remote accounts
//! vidnote poll
//!
//! # Process one job file
//! vidnote process job.txt
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod dropbox;
pub mod notifications;
pub mod pipeline;
pub mod render;
pub mod resolve;
pub mod store;
pub mod tags;
pub mod transcript;
pub mod watch;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use domain::{Analysis, JobOutcome, JobRequest, Tag, VideoReference};
pub use pipeline::JobOrchestrator;
pub use store::{Credential, CredentialStore, Ledger, LedgerRecord};
pub use transcript::{TranscriptResult, TranscriptSegment, TranscriptSource};
