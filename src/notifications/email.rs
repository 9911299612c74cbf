//! SMTP email notification provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::NotificationProvider;

/// SMTP configuration for email delivery
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub to_address: String,
}

/// Sends notifications as plain-text email over SMTP (STARTTLS)
pub struct EmailNotifier {
    settings: EmailSettings,
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn build_transport(&self) -> Result<SmtpTransport> {
        let transport = SmtpTransport::starttls_relay(&self.settings.smtp_host)
            .context("Failed to configure SMTP relay")?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.username.clone(),
                self.settings.password.clone(),
            ))
            .build();

        Ok(transport)
    }
}

#[async_trait]
impl NotificationProvider for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let email = Message::builder()
            .from(
                self.settings
                    .from_address
                    .parse()
                    .context("Invalid from address")?,
            )
            .to(self
                .settings
                .to_address
                .parse()
                .context("Invalid to address")?)
            .subject("vidnote notification")
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .context("Failed to build email")?;

        let transport = self.build_transport()?;

        // lettre's SMTP transport is blocking; keep it off the runtime
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .context("Email send task failed")?
            .context("Failed to send email")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_from_settings() {
        let notifier = EmailNotifier::new(EmailSettings {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: "user".to_string(),
            password: "pass".to_string(),
            from_address: "from@example.com".to_string(),
            to_address: "to@example.com".to_string(),
        });

        assert!(notifier.build_transport().is_ok());
    }
}
