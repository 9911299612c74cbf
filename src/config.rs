//! Configuration for the vidnote service.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (secrets are env-only)
//! 2. Optional config file (<data>/config.yaml)
//! 3. Defaults (~/.vidnote)
//!
//! The data directory itself comes from VIDNOTE_DATA, falling back to
//! ~/.vidnote. Everything else lives under it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::notifications::email::EmailSettings;

const VALID_WHISPER_MODELS: &[&str] = &["tiny", "base", "small", "medium", "large-v3"];

/// Telegram notification settings
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

/// Dropbox app registration settings
#[derive(Debug, Clone)]
pub struct DropboxSettings {
    pub app_key: String,
    pub app_secret: String,
    pub redirect_uri: String,
    pub allowed_accounts: Vec<String>,
}

/// Optional config file schema (<data>/config.yaml)
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    gemini_model: Option<String>,
    whisper_model: Option<String>,
    audio_quality: Option<u32>,
    caption_langs: Option<Vec<String>>,
    max_retries: Option<u32>,
    retry_delay_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    debounce_ms: Option<u64>,
    detailed_logs: Option<bool>,
    tag_learning: Option<bool>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub inbox_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub tokens_dir: PathBuf,
    pub ledger_path: PathBuf,

    /// Required for processing, not for status/accounts commands
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    pub whisper_model: String,
    pub audio_quality: u32,
    pub caption_langs: Vec<String>,

    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub poll_interval_secs: u64,
    pub debounce_ms: u64,

    pub detailed_logs: bool,
    pub tag_learning: bool,

    pub telegram: Option<TelegramSettings>,
    pub email: Option<EmailSettings>,
    pub dropbox: Option<DropboxSettings>,

    pub oauth_host: String,
    pub oauth_port: u16,
}

impl Config {
    /// Load configuration from the environment and the optional file
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("VIDNOTE_DATA") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(".vidnote"),
        };

        let file = load_config_file(&data_dir)?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        let gemini_model = env_or("GEMINI_MODEL", file.gemini_model, "gemini-2.5-flash");

        let mut whisper_model = env_or("WHISPER_MODEL", file.whisper_model, "base");
        if !VALID_WHISPER_MODELS.contains(&whisper_model.as_str()) {
            tracing::warn!(
                model = %whisper_model,
                valid = ?VALID_WHISPER_MODELS,
                "Unknown whisper model, defaulting to 'base'"
            );
            whisper_model = "base".to_string();
        }

        let caption_langs = match std::env::var("CAPTION_LANGS") {
            Ok(langs) => langs
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            Err(_) => file.caption_langs.unwrap_or_else(|| vec!["en".to_string()]),
        };

        let telegram = load_telegram();
        let email = load_email();
        let dropbox = load_dropbox();

        Ok(Self {
            inbox_dir: data_dir.join("Inbox"),
            outbox_dir: data_dir.join("Outbox"),
            archive_dir: data_dir.join("Archive"),
            logs_dir: data_dir.join("Logs"),
            temp_dir: data_dir.join("temp"),
            tokens_dir: data_dir.join("tokens"),
            ledger_path: data_dir.join("ledger.db"),
            data_dir,

            gemini_api_key,
            gemini_model,
            whisper_model,
            audio_quality: env_parse("AUDIO_QUALITY", file.audio_quality, 192),
            caption_langs,

            max_retries: env_parse("MAX_RETRIES", file.max_retries, 3),
            retry_delay_secs: env_parse("RETRY_DELAY", file.retry_delay_secs, 2),
            poll_interval_secs: env_parse("POLL_INTERVAL", file.poll_interval_secs, 30),
            debounce_ms: env_parse("DEBOUNCE_MS", file.debounce_ms, 500),

            detailed_logs: env_flag("ENABLE_DETAILED_LOGS", file.detailed_logs.unwrap_or(true)),
            tag_learning: env_flag("ENABLE_TAG_LEARNING", file.tag_learning.unwrap_or(true)),

            telegram,
            email,
            dropbox,

            oauth_host: std::env::var("OAUTH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            oauth_port: env_parse("OAUTH_PORT", None, 8080),
        })
    }

    /// Create the working directory tree
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.data_dir,
            &self.inbox_dir,
            &self.outbox_dir,
            &self.archive_dir,
            &self.logs_dir,
            &self.temp_dir,
            &self.tokens_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// The Gemini key, required for any command that processes jobs
    pub fn require_gemini_key(&self) -> Result<&str> {
        self.gemini_api_key
            .as_deref()
            .context("GEMINI_API_KEY environment variable is required")
    }

    /// Dropbox settings, required for remote polling and authorization
    pub fn require_dropbox(&self) -> Result<&DropboxSettings> {
        self.dropbox
            .as_ref()
            .context("DROPBOX_APP_KEY and DROPBOX_APP_SECRET are required for remote mode")
    }
}

fn load_config_file(data_dir: &std::path::Path) -> Result<ConfigFile> {
    let path = data_dir.join("config.yaml");

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn env_or(key: &str, file_value: Option<String>, default: &str) -> String {
    std::env::var(key)
        .ok()
        .or(file_value)
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, file_value: Option<T>, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .or(file_value)
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => value.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

fn load_telegram() -> Option<TelegramSettings> {
    if !env_flag("TELEGRAM_ENABLED", false) {
        return None;
    }

    match (
        std::env::var("TELEGRAM_BOT_TOKEN"),
        std::env::var("TELEGRAM_CHAT_ID"),
    ) {
        (Ok(bot_token), Ok(chat_id)) => Some(TelegramSettings { bot_token, chat_id }),
        _ => {
            tracing::warn!(
                "Telegram notifications enabled but TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set"
            );
            None
        }
    }
}

fn load_email() -> Option<EmailSettings> {
    if !env_flag("EMAIL_ENABLED", false) {
        return None;
    }

    let settings = EmailSettings {
        smtp_host: std::env::var("EMAIL_SMTP_HOST")
            .unwrap_or_else(|_| "smtp.gmail.com".to_string()),
        smtp_port: env_parse("EMAIL_SMTP_PORT", None, 587),
        username: std::env::var("EMAIL_USERNAME").unwrap_or_default(),
        password: std::env::var("EMAIL_PASSWORD").unwrap_or_default(),
        from_address: std::env::var("EMAIL_FROM").unwrap_or_default(),
        to_address: std::env::var("EMAIL_TO").unwrap_or_default(),
    };

    if settings.username.is_empty()
        || settings.password.is_empty()
        || settings.from_address.is_empty()
        || settings.to_address.is_empty()
    {
        tracing::warn!("Email notifications enabled but configuration incomplete");
        return None;
    }

    Some(settings)
}

fn load_dropbox() -> Option<DropboxSettings> {
    let (app_key, app_secret) = match (
        std::env::var("DROPBOX_APP_KEY"),
        std::env::var("DROPBOX_APP_SECRET"),
    ) {
        (Ok(key), Ok(secret)) => (key, secret),
        _ => return None,
    };

    let allowed_accounts = std::env::var("ALLOWED_ACCOUNTS")
        .unwrap_or_default()
        .split(',')
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>();

    if allowed_accounts.is_empty() {
        tracing::warn!("No ALLOWED_ACCOUNTS configured; all accounts will be accepted");
    }

    Some(DropboxSettings {
        app_key,
        app_secret,
        redirect_uri: std::env::var("DROPBOX_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8080/oauth/callback".to_string()),
        allowed_accounts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_parsing() {
        let yaml = r#"
gemini_model: gemini-2.5-pro
whisper_model: small
poll_interval_secs: 60
caption_langs:
  - en
  - de
"#;
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(file.gemini_model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(file.whisper_model.as_deref(), Some("small"));
        assert_eq!(file.poll_interval_secs, Some(60));
        assert_eq!(file.caption_langs.unwrap(), vec!["en", "de"]);
    }

    #[test]
    fn test_env_parse_falls_back() {
        assert_eq!(env_parse("VIDNOTE_TEST_UNSET_VAR", Some(7u32), 3), 7);
        assert_eq!(env_parse::<u32>("VIDNOTE_TEST_UNSET_VAR", None, 3), 3);
    }
}
