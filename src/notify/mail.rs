//! SMTP delivery.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{MailSender, OutgoingMail};
use crate::config::SmtpConfig;
use crate::{FriendCircleError, Result};

/// Sends notifications through an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer; implicit TLS when `use_tls`, plain SMTP otherwise.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let password = config
            .password
            .clone()
            .ok_or_else(|| FriendCircleError::Mail("SMTP password is not set".to_string()))?;
        let credentials = Credentials::new(config.email.clone(), password);

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)
                .map_err(|e| FriendCircleError::Mail(format!("invalid SMTP server: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
        };
        let transport = builder.port(config.port).credentials(credentials).build();

        Ok(Self {
            transport,
            from: parse_mailbox(&config.email)?,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| FriendCircleError::Mail(format!("invalid address {address:?}: {e}")))
}

/// Compose a multipart/alternative message with a plain and an HTML body.
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message> {
    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .multipart(MultiPart::alternative_plain_html(
            mail.body.clone(),
            mail.html.clone(),
        ))
        .map_err(|e| FriendCircleError::Mail(format!("failed to build message: {e}")))
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let message = build_message(&self.from, mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| FriendCircleError::Mail(format!("delivery to {} failed: {e}", mail.to)))?;
        debug!(to = %mail.to, subject = %mail.subject, "Mail sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            to: to.to_string(),
            subject: "Blog new post: Hello".to_string(),
            body: "Hello\nhttps://blog.example/hello".to_string(),
            html: "<p>Hello</p>".to_string(),
        }
    }

    #[test]
    fn test_build_message_is_multipart() {
        let from = parse_mailbox("blog@example.com").unwrap();
        let message = build_message(&from, &mail("reader@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Blog new post: Hello"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("To: reader@example.com"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let from = parse_mailbox("blog@example.com").unwrap();
        assert!(matches!(
            build_message(&from, &mail("not an address")),
            Err(FriendCircleError::Mail(_))
        ));
    }

    #[test]
    fn test_new_requires_password() {
        let config = SmtpConfig {
            email: "blog@example.com".to_string(),
            server: "smtp.example.com".to_string(),
            password: None,
            ..SmtpConfig::default()
        };
        assert!(matches!(SmtpMailer::new(&config), Err(FriendCircleError::Mail(_))));
    }

    #[test]
    fn test_new_plain_transport() {
        let config = SmtpConfig {
            email: "blog@example.com".to_string(),
            server: "localhost".to_string(),
            port: 2525,
            use_tls: false,
            password: Some("pw".to_string()),
        };
        assert!(SmtpMailer::new(&config).is_ok());
    }
}
