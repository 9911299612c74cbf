//! Job types: one unit of work per submitted video reference.

use serde::{Deserialize, Serialize};

/// Where a job came from. Identifier namespaces are disjoint between
/// sources, so the same content arriving through both watchers is two
/// distinct jobs by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Local,
    Remote,
}

/// A unit of work handed to the orchestrator.
///
/// The identifier is the idempotency key: stable across retries and
/// process restarts, scoped to the source and the native file handle
/// (`local:{absolute path}` or `dropbox:{account_id}:{file_id}`).
/// It is deliberately not derived from content: resubmitting identical
/// content under a new handle is a new job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Stable, source-qualified identifier
    pub identifier: String,

    /// Original file name (for logs and notifications)
    pub file_name: String,

    /// Raw UTF-8 content of the job file
    pub content: String,

    pub source: JobSource,
    pub account_id: Option<String>,
    pub account_email: Option<String>,
}

impl JobRequest {
    /// Job from a local inbox file
    pub fn local(identifier: String, file_name: String, content: String) -> Self {
        Self {
            identifier,
            file_name,
            content,
            source: JobSource::Local,
            account_id: Some("local".to_string()),
            account_email: None,
        }
    }

    /// Job from a remote account's inbox
    pub fn remote(
        identifier: String,
        file_name: String,
        content: String,
        account_id: String,
        account_email: Option<String>,
    ) -> Self {
        Self {
            identifier,
            file_name,
            content,
            source: JobSource::Remote,
            account_id: Some(account_id),
            account_email,
        }
    }

    /// Account label for notifications (email preferred over raw id)
    pub fn account_label(&self) -> Option<&str> {
        self.account_email
            .as_deref()
            .or(self.account_id.as_deref())
    }
}

/// Terminal outcome of one orchestrator invocation
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Ledger already holds a success record for this identifier;
    /// no side effects were performed.
    Skipped,

    /// Pipeline completed and the artifact was written
    Completed {
        folder_name: String,
        video_id: String,
        title: String,
    },

    /// A stage failed; the failure was recorded and notified
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}
