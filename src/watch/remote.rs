//! Remote inbox polling over Dropbox-style accounts.
//!
//! Per tracked account: a one-time idempotent folder scaffold, then
//! cursor-based delta listing of the remote inbox each tick. The cursor
//! is persisted after every page, so a crash mid-listing never re-reads
//! pages already seen. Accounts are polled sequentially and one
//! account's failure never aborts the others. An expired access token
//! gets exactly one refresh-and-reconnect; a second failure ends that
//! account's tick, not the process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::domain::{JobOutcome, JobRequest};
use crate::dropbox::{CredentialRefresher, RemoteConnector, RemoteError, RemoteFile, RemoteSession};
use crate::pipeline::{is_job_file, JobOrchestrator};
use crate::store::{Credential, CredentialStore, Ledger};
use crate::tags::DEFAULT_TAGS;

const INBOX_FOLDER: &str = "/Inbox";
const OUTBOX_FOLDER: &str = "/Outbox";
const ARCHIVE_FOLDER: &str = "/Archive";
const LOGS_FOLDER: &str = "/Logs";

const README_CONTENT: &str = "\
# vidnote - Video Knowledge Pipeline

This is your vidnote App Folder.

## Folder Structure
- /Inbox/   - Drop .txt files containing YouTube URLs here
- /Outbox/  - Processed notes and audio appear here
- /Archive/ - Processed job files are moved here
- /Logs/    - Processing logs

## Usage
1. Create a .txt file with a YouTube URL (just paste the URL)
2. Upload it to /Inbox/
3. vidnote processes it automatically
4. Find your note in /Outbox/YYYY-MM-DD_Video_Title/

## Tags
Edit /Outbox/tags.txt to customize the tags used for categorization.
";

/// Cursor-based delta-polling job source over multiple accounts
pub struct RemoteWatcher {
    connector: Arc<dyn RemoteConnector>,
    refresher: Arc<dyn CredentialRefresher>,
    credentials: Arc<CredentialStore>,
    ledger: Arc<Ledger>,
    orchestrator: Arc<JobOrchestrator>,

    /// Local outbox holding rendered artifact folders to upload
    outbox_dir: PathBuf,

    poll_interval: Duration,
}

impl RemoteWatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        refresher: Arc<dyn CredentialRefresher>,
        credentials: Arc<CredentialStore>,
        ledger: Arc<Ledger>,
        orchestrator: Arc<JobOrchestrator>,
        outbox_dir: PathBuf,
        poll_interval: Duration,
    ) -> Self {
        Self {
            connector,
            refresher,
            credentials,
            ledger,
            orchestrator,
            outbox_dir,
            poll_interval,
        }
    }

    /// Poll all accounts forever
    pub async fn run(&self) -> Result<()> {
        let accounts = self.credentials.list_account_ids()?;
        if accounts.is_empty() {
            warn!("No authorized accounts found; complete authorization first");
        } else {
            info!(count = accounts.len(), "Monitoring authorized accounts");
        }

        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Started remote watcher"
        );

        loop {
            // Per-account failures are contained inside poll_once; an
            // error here means the credential store itself is unusable
            self.poll_once().await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll every account once. Returns the number of files processed.
    pub async fn poll_once(&self) -> Result<usize> {
        let accounts = self.credentials.list_account_ids()?;

        if accounts.is_empty() {
            debug!("No authorized accounts to poll");
            return Ok(0);
        }

        let mut total = 0;
        for account_id in accounts {
            match self.process_account(&account_id).await {
                Ok(count) => total += count,
                Err(e) => {
                    error!(%account_id, error = %e, "Account poll failed");
                }
            }
        }

        Ok(total)
    }

    /// Authenticate, with exactly one refresh-and-retry on an expired
    /// token. A second failure is terminal for this tick.
    async fn open_session(
        &self,
        account_id: &str,
    ) -> Result<(Box<dyn RemoteSession>, Credential)> {
        let credential = self
            .credentials
            .load(account_id)?
            .with_context(|| format!("No credential for account {}", account_id))?;

        match self.connector.connect(&credential).await {
            Ok(session) => Ok((session, credential)),
            Err(RemoteError::Auth) => {
                warn!(%account_id, "Access token expired, attempting refresh");

                let refreshed = self.refresher.refresh(&credential).await?;
                self.credentials.save(&refreshed)?;

                let session = self
                    .connector
                    .connect(&refreshed)
                    .await
                    .context("Reconnect after token refresh failed")?;

                Ok((session, refreshed))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Process all new job files for one account
    pub async fn process_account(&self, account_id: &str) -> Result<usize> {
        let (session, credential) = self.open_session(account_id).await?;

        if !self.ledger.is_initialized(account_id)? {
            self.initialize_scaffold(session.as_ref(), &credential)
                .await?;
        }

        let new_files = self.list_new_files(session.as_ref(), account_id).await?;

        if new_files.is_empty() {
            return Ok(0);
        }

        info!(
            count = new_files.len(),
            account = %credential.account_email,
            "Found new job files"
        );

        let mut processed = 0;
        for file in new_files {
            match self.handle_file(session.as_ref(), &credential, &file).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(file = %file.name, error = %e, "Error processing remote job file");
                }
            }
        }

        Ok(processed)
    }

    /// List job files added since the saved cursor (or everything on the
    /// first listing), persisting the cursor after each page. A missing
    /// inbox folder means zero new files, not an error.
    pub async fn list_new_files(
        &self,
        session: &dyn RemoteSession,
        account_id: &str,
    ) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();

        let mut page_result = match self.ledger.cursor(account_id)? {
            Some(cursor) => session.list_folder_continue(&cursor).await,
            None => session.list_folder(INBOX_FOLDER).await,
        };

        loop {
            let page = match page_result {
                Ok(page) => page,
                Err(RemoteError::NotFound) => {
                    debug!(%account_id, "Inbox folder not created yet");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e.into()),
            };

            self.ledger.set_cursor(account_id, &page.cursor)?;

            files.extend(
                page.files
                    .into_iter()
                    .filter(|f| is_job_file(Path::new(&f.name))),
            );

            if !page.has_more {
                break;
            }

            page_result = session.list_folder_continue(&page.cursor).await;
        }

        Ok(files)
    }

    /// Download, orchestrate, and on success upload the artifact and
    /// archive the source remotely.
    async fn handle_file(
        &self,
        session: &dyn RemoteSession,
        credential: &Credential,
        file: &RemoteFile,
    ) -> Result<bool> {
        info!(name = %file.name, "Downloading remote job file");

        let bytes = session.download(&file.path_lower).await?;
        let content = String::from_utf8_lossy(&bytes).to_string();

        let job = JobRequest::remote(
            format!("dropbox:{}:{}", credential.account_id, file.id),
            file.name.clone(),
            content,
            credential.account_id.clone(),
            Some(credential.account_email.clone()),
        );

        let outcome = self.orchestrator.process(&job).await?;

        if let JobOutcome::Completed { folder_name, .. } = &outcome {
            self.upload_artifact(session, folder_name).await?;
            self.archive_remote(session, file).await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// One-time folder scaffold: expected sub-folders plus seed content,
    /// tolerating "already exists" conflicts silently.
    async fn initialize_scaffold(
        &self,
        session: &dyn RemoteSession,
        credential: &Credential,
    ) -> Result<()> {
        for folder in [INBOX_FOLDER, OUTBOX_FOLDER, ARCHIVE_FOLDER, LOGS_FOLDER] {
            session.create_folder(folder).await?;
        }

        let seeds = [
            (
                format!("{}/tags.txt", OUTBOX_FOLDER),
                DEFAULT_TAGS.join("\n").into_bytes(),
            ),
            ("/README.txt".to_string(), README_CONTENT.as_bytes().to_vec()),
        ];

        for (path, bytes) in seeds {
            match session.upload(&path, bytes, false).await {
                Ok(()) | Err(RemoteError::Conflict) => {}
                Err(e) => {
                    warn!(%path, error = %e, "Could not seed scaffold file");
                }
            }
        }

        self.ledger.mark_initialized(&credential.account_id)?;
        info!(account = %credential.account_email, "Initialized folder scaffold");

        Ok(())
    }

    /// Upload a rendered artifact folder to the account's outbox
    async fn upload_artifact(&self, session: &dyn RemoteSession, folder_name: &str) -> Result<()> {
        let local_folder = self.outbox_dir.join(folder_name);
        let remote_folder = format!("{}/{}", OUTBOX_FOLDER, folder_name);

        session.create_folder(&remote_folder).await?;

        let mut entries = tokio::fs::read_dir(&local_folder)
            .await
            .with_context(|| format!("Missing artifact folder: {}", local_folder.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let name = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            let bytes = tokio::fs::read(&path).await?;

            session
                .upload(&format!("{}/{}", remote_folder, name), bytes, true)
                .await?;
            debug!(file = %name, "Uploaded artifact file");
        }

        info!(folder = %remote_folder, "Uploaded artifact folder");
        Ok(())
    }

    /// Move a processed job file into the remote archive
    async fn archive_remote(&self, session: &dyn RemoteSession, file: &RemoteFile) -> Result<()> {
        let dest = format!("{}/{}", ARCHIVE_FOLDER, file.name);
        session.move_file(&file.path_lower, &dest).await?;
        info!(%dest, "Moved processed job to archive");
        Ok(())
    }
}
