//! Command-line interface for vidnote.
//!
//! Provides commands for watching the local inbox, polling remote
//! accounts, one-shot processing, ledger statistics, and account
//! management.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use tracing::{info, warn};

use crate::adapters::{GeminiClient, WhisperTranscriber, YtDlpDownloader};
use crate::config::Config;
use crate::domain::{JobOutcome, JobRequest};
use crate::dropbox::{DropboxConnector, OAuthClient, OAuthSettings};
use crate::notifications::{EmailNotifier, NotificationManager, TelegramNotifier};
use crate::pipeline::{AnalysisEngine, JobLogWriter, JobOrchestrator};
use crate::render::NoteRenderer;
use crate::store::{CredentialStore, Ledger};
use crate::tags::TagCatalog;
use crate::watch::{LocalWatcher, RemoteWatcher};

/// vidnote - video knowledge pipeline
#[derive(Parser, Debug)]
#[command(name = "vidnote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the local inbox for new job files
    Watch,

    /// Poll remote accounts for new job files
    Poll {
        /// Poll once and exit
        #[arg(long)]
        once: bool,
    },

    /// Process a single local job file
    Process {
        /// Path to the job file (.txt containing a video URL)
        file: PathBuf,
    },

    /// Show ledger statistics
    Status {
        /// Filter by account id
        #[arg(short, long)]
        account: Option<String>,
    },

    /// List authorized remote accounts
    Accounts,

    /// Run the OAuth authorization server
    Authorize,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = Config::load()?;

        match self.command {
            Commands::Watch => cmd_watch(config).await,
            Commands::Poll { once } => cmd_poll(config, once).await,
            Commands::Process { file } => cmd_process(config, file).await,
            Commands::Status { account } => cmd_status(config, account),
            Commands::Accounts => cmd_accounts(config),
            Commands::Authorize => cmd_authorize(config).await,
        }
    }
}

/// Exclusive lock so only one watcher runs against a data directory.
/// The ledger's exactly-once guarantee assumes a single writer.
fn acquire_instance_lock(data_dir: &Path) -> Result<std::fs::File> {
    let path = data_dir.join("vidnote.lock");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

    file.try_lock_exclusive().with_context(|| {
        format!(
            "Another vidnote instance is already running against {}",
            data_dir.display()
        )
    })?;

    Ok(file)
}

fn build_notifier(config: &Config) -> Arc<NotificationManager> {
    let mut manager = NotificationManager::new();

    if let Some(telegram) = &config.telegram {
        manager.add_provider(Box::new(TelegramNotifier::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )));
    }

    if let Some(email) = &config.email {
        manager.add_provider(Box::new(EmailNotifier::new(email.clone())));
    }

    if manager.is_empty() {
        warn!("No notification providers enabled");
    }

    Arc::new(manager)
}

fn build_orchestrator(config: &Config, ledger: Arc<Ledger>) -> Result<Arc<JobOrchestrator>> {
    let api_key = config.require_gemini_key()?.to_string();

    let downloader = Arc::new(YtDlpDownloader::new(
        config.temp_dir.clone(),
        config.audio_quality,
        config.caption_langs.clone(),
    ));
    let transcriber = Arc::new(WhisperTranscriber::new(config.whisper_model.clone()));

    let summarizer = Arc::new(GeminiClient::new(api_key, config.gemini_model.clone()));
    let analyzer = AnalysisEngine::new(
        summarizer,
        config.max_retries,
        Duration::from_secs(config.retry_delay_secs),
    );

    let tags = Arc::new(TagCatalog::open(&config.outbox_dir, config.tag_learning)?);
    let renderer = NoteRenderer::new(&config.outbox_dir);
    let joblog = JobLogWriter::new(&config.logs_dir, config.detailed_logs);

    Ok(Arc::new(JobOrchestrator::new(
        downloader,
        transcriber,
        analyzer,
        ledger,
        build_notifier(config),
        tags,
        renderer,
        joblog,
    )))
}

async fn cmd_watch(config: Config) -> Result<()> {
    config.ensure_dirs()?;
    let _lock = acquire_instance_lock(&config.data_dir)?;

    let ledger = Arc::new(Ledger::open(&config.ledger_path)?);
    let orchestrator = build_orchestrator(&config, ledger)?;

    info!(
        inbox = %config.inbox_dir.display(),
        outbox = %config.outbox_dir.display(),
        "Starting local mode"
    );
    info!("Add .txt files with video URLs to the inbox");

    let watcher = LocalWatcher::new(
        config.inbox_dir.clone(),
        config.archive_dir.clone(),
        orchestrator,
        Duration::from_millis(config.debounce_ms),
    )?;

    watcher.run().await
}

async fn cmd_poll(config: Config, once: bool) -> Result<()> {
    config.ensure_dirs()?;
    let _lock = acquire_instance_lock(&config.data_dir)?;

    let dropbox = config.require_dropbox()?.clone();
    let ledger = Arc::new(Ledger::open(&config.ledger_path)?);
    let orchestrator = build_orchestrator(&config, ledger.clone())?;
    let credentials = Arc::new(CredentialStore::open(&config.tokens_dir)?);

    let oauth = Arc::new(OAuthClient::new(OAuthSettings {
        app_key: dropbox.app_key,
        app_secret: dropbox.app_secret,
        redirect_uri: dropbox.redirect_uri,
        allowed_accounts: dropbox.allowed_accounts,
    }));

    let watcher = RemoteWatcher::new(
        Arc::new(DropboxConnector::new()),
        oauth.clone(),
        credentials.clone(),
        ledger,
        orchestrator,
        config.outbox_dir.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );

    if once {
        let processed = watcher.poll_once().await?;
        info!(processed, "Poll complete");
        return Ok(());
    }

    // Callback server runs alongside the poller so new accounts can be
    // admitted without a restart. It only writes credential records.
    let addr: std::net::SocketAddr = format!("{}:{}", config.oauth_host, config.oauth_port)
        .parse()
        .context("Invalid OAuth server address")?;
    tokio::spawn(async move {
        if let Err(e) = crate::dropbox::run_callback_server(oauth, credentials, addr).await {
            tracing::error!(error = %e, "OAuth server stopped");
        }
    });

    watcher.run().await
}

async fn cmd_process(config: Config, file: PathBuf) -> Result<()> {
    config.ensure_dirs()?;

    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read job file: {}", file.display()))?;

    let absolute = file.canonicalize().unwrap_or_else(|_| file.clone());
    let file_name = file
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let ledger = Arc::new(Ledger::open(&config.ledger_path)?);
    let orchestrator = build_orchestrator(&config, ledger)?;

    let job = JobRequest::local(format!("local:{}", absolute.display()), file_name, content);

    match orchestrator.process(&job).await? {
        JobOutcome::Completed {
            folder_name, title, ..
        } => {
            println!("Processed: {}", title);
            println!("Output folder: {}", folder_name);
        }
        JobOutcome::Skipped => {
            println!("Already processed, skipping");
        }
        JobOutcome::Failed { error } => {
            anyhow::bail!("Processing failed: {}", error);
        }
    }

    Ok(())
}

fn cmd_status(config: Config, account: Option<String>) -> Result<()> {
    let ledger = Ledger::open(&config.ledger_path)?;
    let stats = ledger.stats(account.as_deref())?;

    if stats.is_empty() {
        println!("No processed jobs recorded");
        return Ok(());
    }

    println!("Processed jobs:");
    for (status, count) in stats {
        println!("  {:10} {}", status, count);
    }

    Ok(())
}

fn cmd_accounts(config: Config) -> Result<()> {
    let store = CredentialStore::open(&config.tokens_dir)?;
    let accounts = store.list_account_ids()?;

    if accounts.is_empty() {
        println!("No authorized accounts. Run `vidnote authorize` to add one.");
        return Ok(());
    }

    println!("Authorized accounts:");
    for account_id in accounts {
        match store.load(&account_id)? {
            Some(credential) => {
                println!("  {} ({})", credential.account_email, account_id)
            }
            None => println!("  {}", account_id),
        }
    }

    Ok(())
}

async fn cmd_authorize(config: Config) -> Result<()> {
    config.ensure_dirs()?;

    let dropbox = config.require_dropbox()?.clone();
    let credentials = Arc::new(CredentialStore::open(&config.tokens_dir)?);

    let oauth = Arc::new(OAuthClient::new(OAuthSettings {
        app_key: dropbox.app_key,
        app_secret: dropbox.app_secret,
        redirect_uri: dropbox.redirect_uri,
        allowed_accounts: dropbox.allowed_accounts,
    }));

    let addr: std::net::SocketAddr = format!("{}:{}", config.oauth_host, config.oauth_port)
        .parse()
        .context("Invalid OAuth server address")?;

    info!(
        "Visit http://localhost:{} to begin authorization",
        config.oauth_port
    );

    crate::dropbox::run_callback_server(oauth, credentials, addr).await
}
