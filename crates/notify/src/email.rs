use crate::render::plain_text;
use async_trait::async_trait;
use crush_core::config::EmailConfig;
use crush_core::notify::entity::ScanReport;
use crush_core::notify::error::NotifyError;
use crush_core::notify::port::NotificationSink;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

/// # Summary
/// A notification sink that emails scan reports via SMTP (e.g., Gmail, QQ Mail).
///
/// # Invariants
/// - Requires valid SMTP credentials and server configuration.
/// - The `AsyncSmtpTransport` is reused for every report.
/// - Addresses are validated once at construction.
pub struct EmailSink {
    /// The asynchronous SMTP transport.
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    /// The sender's mailbox.
    from: Mailbox,
    /// The recipient's mailbox.
    to: Mailbox,
}

impl EmailSink {
    /// # Summary
    /// Creates a new `EmailSink`.
    ///
    /// # Logic
    /// 1. Parses the sender and recipient addresses.
    /// 2. Configures the relay transport (submission port with TLS) and authentication.
    ///
    /// # Returns
    /// * A new instance of `EmailSink` or `NotifyError::Config`.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from = config
            .from
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid from address: {}", e)))?;
        let to = config
            .to
            .parse()
            .map_err(|e| NotifyError::Config(format!("Invalid to address: {}", e)))?;

        let creds = Credentials::new(config.user.clone(), config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Config(format!("Invalid SMTP host: {}", e)))?
            .credentials(creds)
            .build();

        Ok(Self { mailer, from, to })
    }

    /// Builds the plain-text message for a report.
    pub fn compose(&self, report: &ScanReport) -> Result<Message, NotifyError> {
        let subject = format!(
            "{} - {}",
            report.title,
            report.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(plain_text(report, false))
            .map_err(|e| NotifyError::Payload(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl NotificationSink for EmailSink {
    fn name(&self) -> &str {
        "email"
    }

    /// # Summary
    /// Sends the report as a plain-text email.
    ///
    /// # Returns
    /// * `Err(NotifyError::Network)` if the SMTP exchange fails.
    async fn deliver(&self, report: &ScanReport) -> Result<(), NotifyError> {
        let email = self.compose(report)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Network(format!("SMTP error: {}", e)))?;
        Ok(())
    }
}
