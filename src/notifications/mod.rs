//! Notifications for job outcomes.
//!
//! Providers implement a single `send` capability; the manager fans a
//! pre-formatted message out to every registered provider. Delivery
//! failure is logged and never fails the job, and one provider's
//! failure never blocks another.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;

use crate::domain::Tag;

pub mod email;
pub mod telegram;

pub use email::EmailNotifier;
pub use telegram::TelegramNotifier;

/// A notification transport
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str) -> Result<()>;
}

/// Context for a success notification
#[derive(Debug)]
pub struct SuccessNotification<'a> {
    pub title: &'a str,
    pub channel: &'a str,
    pub duration_secs: u64,
    pub output_folder: &'a str,
    pub tags: &'a [Tag],
    pub transcript_source: String,
    pub summary_excerpt: &'a str,
    pub account: Option<&'a str>,
}

/// Fans messages out to all registered providers
#[derive(Default)]
pub struct NotificationManager {
    providers: Vec<Box<dyn NotificationProvider>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Box<dyn NotificationProvider>) {
        tracing::info!(provider = provider.name(), "Added notification provider");
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    async fn send_all(&self, message: &str) {
        for provider in &self.providers {
            if let Err(e) = provider.send(message).await {
                tracing::error!(provider = provider.name(), error = %e, "Notification failed");
            } else {
                tracing::debug!(provider = provider.name(), "Notification sent");
            }
        }
    }

    /// Announce a successfully processed video
    pub async fn notify_success(&self, ctx: &SuccessNotification<'_>) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let duration = format!(
            "{}m {}s",
            ctx.duration_secs / 60,
            ctx.duration_secs % 60
        );

        let mut parts = vec![
            "\u{2705} <b>Video Processed Successfully</b>".to_string(),
            String::new(),
            format!("<b>Title:</b> {}", ctx.title),
            format!("<b>Channel:</b> {}", ctx.channel),
            format!("<b>Duration:</b> {}", duration),
            format!("<b>Time:</b> {}", timestamp),
        ];

        if let Some(account) = ctx.account {
            parts.push(format!("<b>Account:</b> {}", account));
        }

        parts.push(String::new());
        parts.push(format!("<b>Transcript Source:</b> {}", ctx.transcript_source));
        parts.push(format!("<b>Output:</b> {}", ctx.output_folder));
        parts.push(String::new());
        parts.push("<b>Tags:</b>".to_string());

        for tag in ctx.tags {
            let marker = if tag.primary { " \u{2b50}" } else { "" };
            parts.push(format!("  \u{2022} {} ({}%){}", tag.name, tag.confidence, marker));
        }

        let excerpt: String = ctx.summary_excerpt.chars().take(300).collect();
        parts.push(String::new());
        parts.push("<b>Summary Preview:</b>".to_string());
        parts.push(format!("<code>{}...</code>", excerpt));

        self.send_all(&parts.join("\n")).await;
    }

    /// Announce a failed job
    pub async fn notify_error(
        &self,
        video_id: &str,
        url: &str,
        error_message: &str,
        account: Option<&str>,
    ) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

        let mut parts = vec![
            "\u{274c} <b>Video Processing Failed</b>".to_string(),
            String::new(),
            format!("<b>Video ID:</b> {}", video_id),
            format!("<b>URL:</b> {}", url),
            format!("<b>Time:</b> {}", timestamp),
        ];

        if let Some(account) = account {
            parts.push(format!("<b>Account:</b> {}", account));
        }

        parts.push(String::new());
        parts.push("<b>Error:</b>".to_string());
        parts.push(format!("<code>{}</code>", error_message));

        self.send_all(&parts.join("\n")).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, _message: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated delivery failure");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_one_failing_provider_does_not_block_others() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let mut manager = NotificationManager::new();
        manager.add_provider(Box::new(RecordingProvider {
            calls: first.clone(),
            fail: true,
        }));
        manager.add_provider(Box::new(RecordingProvider {
            calls: second.clone(),
            fail: false,
        }));

        manager
            .notify_error("vid", "https://example", "boom", None)
            .await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_message_lists_tags() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = NotificationManager::new();
        manager.add_provider(Box::new(RecordingProvider {
            calls: calls.clone(),
            fail: false,
        }));

        let tags = vec![Tag {
            name: "education".to_string(),
            confidence: 92,
            primary: true,
        }];

        manager
            .notify_success(&SuccessNotification {
                title: "T",
                channel: "C",
                duration_secs: 125,
                output_folder: "2026-01-01_T",
                tags: &tags,
                transcript_source: "youtube_manual".to_string(),
                summary_excerpt: "summary",
                account: Some("user@example.com"),
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
