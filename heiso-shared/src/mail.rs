//! Outgoing email
//!
//! Flows that notify people (invitations, approvals, login codes, password resets) send
//! through a [`Mailer`]. Production uses [`HttpMailer`] against a JSON relay,
//! development falls back to [`LogMailer`], and tests capture messages with
//! [`MemoryMailer`].

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from sending mail
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// A rendered message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(
            to = ?message.to,
            subject = %message.subject,
            "Mail delivery disabled, message logged"
        );
        Ok(())
    }
}

/// Posts messages as JSON to an HTTP relay (`{from, to, subject, html}`)
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), subject = %message.subject, "Mail relay rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = ?message.to, subject = %message.subject, "Mail sent");
        Ok(())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Most recent message addressed to `to`
    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.messages()
            .into_iter()
            .rev()
            .find(|m| m.to.iter().any(|t| t.eq_ignore_ascii_case(to)))
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("mailbox poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

/// Message templates. Names and other user input are HTML-escaped.
pub mod templates {
    use super::EmailMessage;
    use html_escape::encode_text;

    /// Invitation to join a tenant. The link carries the invite token.
    pub fn invite(from: &str, to: &str, base_host: &str, tenant_name: &str, token: &str) -> EmailMessage {
        let link = format!("{}/join?token={}", base_host.trim_end_matches('/'), token);
        EmailMessage {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: format!("You have been invited to join {}", tenant_name),
            html: format!(
                "<p>You have been invited to join <strong>{}</strong>.</p>\
                 <p><a href=\"{link}\">Accept the invitation</a></p>\
                 <p>This link expires in 7 days.</p>",
                encode_text(tenant_name)
            ),
        }
    }

    /// Login verification code
    pub fn login_code(from: &str, to: &str, username: &str, code: &str, expires_in_minutes: i64) -> EmailMessage {
        EmailMessage {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Your Login Verification Code".to_string(),
            html: format!(
                "<p>Hi {},</p>\
                 <p>Your verification code is <strong>{code}</strong>.</p>\
                 <p>It expires in {expires_in_minutes} minutes.</p>",
                encode_text(username)
            ),
        }
    }

    /// Membership approved after review
    pub fn approved(from: &str, to: &str, base_host: &str, tenant_name: &str) -> EmailMessage {
        let link = format!("{}/login", base_host.trim_end_matches('/'));
        EmailMessage {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: format!("Your access to {} has been approved", tenant_name),
            html: format!(
                "<p>Your request to join <strong>{}</strong> has been approved.</p>\
                 <p><a href=\"{link}\">Sign in</a></p>",
                encode_text(tenant_name)
            ),
        }
    }

    /// Password reset link
    pub fn password_reset(from: &str, to: &str, base_host: &str, token: &str) -> EmailMessage {
        let link = format!(
            "{}/auth/reset-password?token={}",
            base_host.trim_end_matches('/'),
            token
        );
        EmailMessage {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Reset your password".to_string(),
            html: format!(
                "<p>We received a request to reset your password.</p>\
                 <p><a href=\"{link}\">Choose a new password</a></p>\
                 <p>The link is valid for one hour. Ignore this email if you did not ask for it.</p>"
            ),
        }
    }
}

/// Shared handle used by application state
pub type SharedMailer = Arc<dyn Mailer>;

/// A mailer plus the sender address and public base URL the templates need
#[derive(Clone)]
pub struct Notifier {
    mailer: SharedMailer,
    from: String,
    base_host: String,
}

impl Notifier {
    pub fn new(mailer: SharedMailer, from: impl Into<String>, base_host: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
            base_host: base_host.into(),
        }
    }

    pub async fn invite(&self, to: &str, tenant_name: &str, token: &str) -> Result<(), MailError> {
        self.mailer
            .send(templates::invite(&self.from, to, &self.base_host, tenant_name, token))
            .await
    }

    pub async fn login_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
        expires_in_minutes: i64,
    ) -> Result<(), MailError> {
        self.mailer
            .send(templates::login_code(&self.from, to, username, code, expires_in_minutes))
            .await
    }

    pub async fn approved(&self, to: &str, tenant_name: &str) -> Result<(), MailError> {
        self.mailer
            .send(templates::approved(&self.from, to, &self.base_host, tenant_name))
            .await
    }

    pub async fn password_reset(&self, to: &str, token: &str) -> Result<(), MailError> {
        self.mailer
            .send(templates::password_reset(&self.from, to, &self.base_host, token))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mailer_records_messages() {
        let mailer = MemoryMailer::new();
        mailer
            .send(templates::login_code("no-reply@heiso.io", "a@example.com", "Ann", "123456", 10))
            .await
            .unwrap();

        let last = mailer.last_to("A@example.com").unwrap();
        assert!(last.html.contains("123456"));
        assert_eq!(mailer.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let message = templates::password_reset("from@x.io", "to@x.io", "https://cms.x.io", "tok");
        assert!(LogMailer.send(message).await.is_ok());
    }

    #[tokio::test]
    async fn test_notifier_fills_sender_and_host() {
        let memory = MemoryMailer::new();
        let notifier = Notifier::new(Arc::new(memory.clone()), "cms@x.io", "https://cms.x.io");
        notifier.password_reset("to@x.io", "tok").await.unwrap();

        let sent = memory.last_to("to@x.io").unwrap();
        assert_eq!(sent.from, "cms@x.io");
        assert!(sent.html.contains("https://cms.x.io/auth/reset-password?token=tok"));
    }

    #[test]
    fn test_reset_link_format() {
        let message = templates::password_reset("from@x.io", "to@x.io", "https://cms.x.io/", "abc");
        assert!(message
            .html
            .contains("https://cms.x.io/auth/reset-password?token=abc"));
    }

    #[test]
    fn test_invite_link_format() {
        let message = templates::invite("from@x.io", "to@x.io", "https://cms.x.io", "Acme", "tok20");
        assert!(message.html.contains("https://cms.x.io/join?token=tok20"));
        assert!(message.subject.contains("Acme"));
    }

    #[test]
    fn test_templates_escape_names() {
        let hostile = "<img src=x onerror=alert(1)>";

        let invite = templates::invite("from@x.io", "to@x.io", "https://cms.x.io", hostile, "tok");
        assert!(!invite.html.contains("<img"));
        assert!(invite.html.contains("&lt;img src=x onerror=alert(1)&gt;"));

        let code = templates::login_code("from@x.io", "to@x.io", hostile, "123456", 10);
        assert!(!code.html.contains("<img"));
        assert!(code.html.contains("<strong>123456</strong>"));

        let approved = templates::approved("from@x.io", "to@x.io", "https://cms.x.io", hostile);
        assert!(!approved.html.contains("<img"));
    }

    #[test]
    fn test_approved_links_to_login() {
        let message = templates::approved("from@x.io", "to@x.io", "https://cms.x.io/", "Acme");
        assert!(message.html.contains("https://cms.x.io/login"));
        assert!(message.subject.contains("Acme"));
    }
}
