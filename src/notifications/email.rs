//! SMTP delivery for workflow notifications.

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{Notification, Notifier};
use crate::config::EmailConfig;

/// Sends notifications through the configured SMTP relay
pub struct SystemEmailService {
    config: EmailConfig,
}

impl SystemEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = notification.recipient().parse()?;
        let text_body = notification.text_body();

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(notification.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(render_html(&notification.subject(), &text_body)),
                    ),
            )?;

        Ok(message)
    }
}

#[async_trait]
impl Notifier for SystemEmailService {
    async fn send(&self, notification: &Notification) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                kind = notification.kind(),
                "Email not configured, skipping notification to {}",
                notification.recipient()
            );
            return Ok(());
        }

        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;

        let email = self.build_message(notification)?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(
            to = %notification.recipient(),
            kind = notification.kind(),
            "Email sent successfully"
        );

        Ok(())
    }
}

/// Wrap the plain-text body in a minimal HTML card
fn render_html(subject: &str, text_body: &str) -> String {
    let paragraphs: String = text_body
        .split("\n\n")
        .map(|p| format!("<p>{}</p>", html_escape(p).replace('\n', "<br>")))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{subject}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
        .card {{ max-width: 560px; margin: 0 auto; background-color: #ffffff; border-radius: 8px; overflow: hidden; }}
        .header {{ background-color: #1f6f5c; color: white; padding: 20px; }}
        .content {{ padding: 20px; color: #374151; line-height: 1.6; }}
        .footer {{ padding: 15px; text-align: center; color: #9ca3af; font-size: 12px; border-top: 1px solid #eee; }}
    </style>
</head>
<body>
    <div class="card">
        <div class="header"><h2>{subject}</h2></div>
        <div class="content">{paragraphs}</div>
        <div class="footer">Grievance Desk</div>
    </div>
</body>
</html>"#,
        subject = html_escape(subject),
        paragraphs = paragraphs,
    )
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
