//! Outbound email
//!
//! `Notifier` is the delivery seam used by the publish fan-out. The SMTP
//! implementation is used when mail is enabled; otherwise messages are only
//! logged.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

use crate::config::MailConfig;

/// Port that speaks TLS from the first byte; anything else upgrades with STARTTLS
const IMPLICIT_TLS_PORT: u16 = 465;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Whether `email` is an address mail can be sent to.
///
/// Follows the SMTP transport's own address grammar and additionally
/// requires a dotted domain, so `carol@localhost` is refused.
pub fn is_deliverable_address(email: &str) -> bool {
    match email.parse::<Address>() {
        Ok(address) => {
            let domain = address.domain();
            domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        Err(_) => false,
    }
}

/// Pick the notifier matching the mail configuration
pub fn notifier_from_config(config: &MailConfig) -> Result<DynNotifier> {
    if config.enabled {
        Ok(Arc::new(SmtpNotifier::from_config(config)?))
    } else {
        tracing::info!("Mail delivery disabled, notifications will be logged only");
        Ok(Arc::new(LogNotifier))
    }
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(anyhow!("SMTP host not configured"));
        }
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from_address, e))?;

        let builder = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?;

        let mut builder = builder.port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|e| anyhow!("Invalid to address '{}': {}", to, e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes each message to the log instead of sending it
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        tracing::info!(to, subject, "Email (not sent, mail disabled)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_config() -> MailConfig {
        MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "newsroom".to_string(),
            smtp_password: "secret".to_string(),
            from_address: "Newsroom <newsroom@example.com>".to_string(),
        }
    }

    #[test]
    fn test_deliverable_address() {
        assert!(is_deliverable_address("carol@example.com"));
        assert!(is_deliverable_address("carol.smith+news@mail.example.org"));
        assert!(!is_deliverable_address("carol"));
        assert!(!is_deliverable_address("@example.com"));
        assert!(!is_deliverable_address("carol@localhost"));
        assert!(!is_deliverable_address("ca rol@example.com"));
        assert!(!is_deliverable_address("carol@exa mple.com"));
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        assert!(LogNotifier.send("carol@example.com", "Hi", "Body").await.is_ok());
    }

    #[tokio::test]
    async fn test_smtp_notifier_builds_from_config() {
        assert!(SmtpNotifier::from_config(&mail_config()).is_ok());

        let mut implicit = mail_config();
        implicit.smtp_port = 465;
        assert!(SmtpNotifier::from_config(&implicit).is_ok());
    }

    #[tokio::test]
    async fn test_smtp_notifier_rejects_bad_config() {
        let mut no_host = mail_config();
        no_host.smtp_host.clear();
        assert!(SmtpNotifier::from_config(&no_host).is_err());

        let mut bad_from = mail_config();
        bad_from.from_address = "not an address".to_string();
        assert!(SmtpNotifier::from_config(&bad_from).is_err());
    }

    #[tokio::test]
    async fn test_disabled_mail_selects_log_notifier() {
        let mut config = mail_config();
        config.enabled = false;
        config.smtp_host.clear();
        let notifier = notifier_from_config(&config).unwrap();
        assert!(notifier.send("x@example.com", "s", "b").await.is_ok());
    }
}
