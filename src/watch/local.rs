//! Local inbox watcher.
//!
//! Watches a local directory for new job files (.txt with a video URL),
//! processing each synchronously end-to-end before accepting the next.
//! The in-flight set exists to reject duplicate filesystem events for a
//! file already mid-processing, not to enable parallelism. Pre-existing
//! files are drained through the same path at startup.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::JobRequest;
use crate::pipeline::{is_job_file, JobOrchestrator};

/// Filesystem-event-driven job source
pub struct LocalWatcher {
    inbox_dir: PathBuf,
    archive_dir: PathBuf,
    orchestrator: Arc<JobOrchestrator>,

    /// Wait after an event before reading, so the writer can finish
    debounce: Duration,

    /// Paths currently being processed
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl LocalWatcher {
    pub fn new(
        inbox_dir: PathBuf,
        archive_dir: PathBuf,
        orchestrator: Arc<JobOrchestrator>,
        debounce: Duration,
    ) -> Result<Self> {
        std::fs::create_dir_all(&inbox_dir)
            .with_context(|| format!("Failed to create inbox: {}", inbox_dir.display()))?;
        std::fs::create_dir_all(&archive_dir)
            .with_context(|| format!("Failed to create archive: {}", archive_dir.display()))?;

        info!(inbox = %inbox_dir.display(), "Initialized local watcher");

        Ok(Self {
            inbox_dir,
            archive_dir,
            orchestrator,
            debounce,
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Process any job files already sitting in the inbox
    pub async fn drain_existing(&self) -> Result<usize> {
        info!("Checking for existing job files in inbox");

        let mut processed = 0;
        let mut entries = tokio::fs::read_dir(&self.inbox_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !is_job_file(&path) {
                continue;
            }

            match self.handle_file(&path, false).await {
                Ok(archived) => {
                    if archived {
                        processed += 1;
                    }
                }
                Err(e) => {
                    error!(file = %path.display(), error = %e, "Error processing existing file");
                }
            }
        }

        if processed > 0 {
            info!(count = processed, "Processed existing job files");
        } else {
            info!("No existing job files to process");
        }

        Ok(processed)
    }

    /// Drain the inbox, then watch for new files until the process stops
    pub async fn run(&self) -> Result<()> {
        self.drain_existing().await?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer =
            new_debouncer(Duration::from_secs(1), tx).context("Failed to create watcher")?;
        debouncer
            .watcher()
            .watch(&self.inbox_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch inbox: {}", self.inbox_dir.display()))?;

        info!(inbox = %self.inbox_dir.display(), "Watching for new job files");

        loop {
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(Ok(events)) => {
                    for event in events {
                        let path = event.path;
                        if !is_job_file(&path) || !path.exists() {
                            continue;
                        }

                        if let Err(e) = self.handle_file(&path, true).await {
                            error!(file = %path.display(), error = %e, "Error handling job file");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = ?e, "Watcher error");
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    // Expected; loop around
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process one job file. Returns true if it completed and was
    /// archived. Duplicate events for a file already in flight are
    /// dropped here.
    async fn handle_file(&self, path: &Path, debounce: bool) -> Result<bool> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(path.to_path_buf()) {
                debug!(file = %path.display(), "Already in flight, ignoring duplicate event");
                return Ok(false);
            }
        }

        let result = self.process_file(path, debounce).await;

        self.in_flight.lock().await.remove(path);

        result
    }

    async fn process_file(&self, path: &Path, debounce: bool) -> Result<bool> {
        if debounce {
            tokio::time::sleep(self.debounce).await;
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;

        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        info!(file = %file_name, "New job file detected");

        let job = JobRequest::local(
            format!("local:{}", absolute.display()),
            file_name.clone(),
            content,
        );

        let outcome = self.orchestrator.process(&job).await?;

        if outcome.is_completed() {
            let archive_path = unique_destination(&self.archive_dir, &file_name);
            tokio::fs::rename(path, &archive_path)
                .await
                .with_context(|| format!("Failed to archive job file: {}", path.display()))?;
            info!(archived = %archive_path.display(), "Moved job file to archive");
            return Ok(true);
        }

        Ok(false)
    }
}

/// Archive destination that does not clobber an existing file
fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let timestamp = Local::now().format("%H%M%S");
    dir.join(format!("{}_{}", timestamp, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unique_destination_avoids_clobber() {
        let temp = TempDir::new().unwrap();

        let first = unique_destination(temp.path(), "job.txt");
        assert_eq!(first, temp.path().join("job.txt"));

        std::fs::write(&first, b"x").unwrap();
        let second = unique_destination(temp.path(), "job.txt");
        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_job.txt"));
    }
}
