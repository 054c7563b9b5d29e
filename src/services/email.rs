//! Outgoing mail: reminders, reports and CSV exports

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// File attached to a message
#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A message ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachment: Option<MailAttachment>,
}

impl OutgoingMail {
    pub fn text(to: &str, subject: &str, body: String) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            text_body: body,
            html_body: None,
            attachment: None,
        }
    }
}

/// Mail transport
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> AppResult<()>;
}

/// SMTP transport built from the `email` configuration
#[derive(Clone)]
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, mail: &OutgoingMail) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Libris");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Mail(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(&mail.to)
            .map_err(|e| AppError::Mail(format!("Invalid to address: {}", e)))?;

        let text = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(mail.text_body.clone());

        let body = match &mail.html_body {
            Some(html) => MultiPart::alternative().singlepart(text).singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.clone()),
            ),
            None => MultiPart::mixed().singlepart(text),
        };

        let body = match &mail.attachment {
            Some(file) => {
                let content_type = ContentType::parse(&file.content_type)
                    .map_err(|e| AppError::Mail(format!("Invalid attachment type: {}", e)))?;
                MultiPart::mixed()
                    .multipart(body)
                    .singlepart(Attachment::new(file.filename.clone()).body(file.bytes.clone(), content_type))
            }
            None => body,
        };

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(mail.subject.clone())
            .multipart(body)
            .map_err(|e| AppError::Mail(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Mail(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) = (
            &self.config.smtp_username,
            &self.config.smtp_password,
        ) {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        Ok(mailer_builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> AppResult<()> {
        let message = self.build_message(&mail)?;
        let transport = self.transport()?;

        // lettre's SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| AppError::Mail(format!("Mail task failed: {}", e)))?
            .map_err(|e| AppError::Mail(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(EmailConfig::default())
    }

    #[test]
    fn test_build_plain_message() {
        let mail = OutgoingMail::text("reader@example.org", "Hello", "Body".to_string());
        let message = mailer().build_message(&mail).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("reader@example.org"));
        assert!(raw.contains("noreply@libris.org"));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mail = OutgoingMail {
            attachment: Some(MailAttachment {
                filename: "book_requests.csv".to_string(),
                content_type: "text/csv".to_string(),
                bytes: b"id,username\n1,alice\n".to_vec(),
            }),
            ..OutgoingMail::text("librarian@example.org", "Export", "Attached".to_string())
        };
        let raw = String::from_utf8(mailer().build_message(&mail).unwrap().formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("book_requests.csv"));
        assert!(raw.contains("text/csv"));
    }

    #[test]
    fn test_invalid_recipient_is_mail_error() {
        let mail = OutgoingMail::text("not an address", "Hello", String::new());
        assert!(matches!(
            mailer().build_message(&mail),
            Err(AppError::Mail(_))
        ));
    }
}
