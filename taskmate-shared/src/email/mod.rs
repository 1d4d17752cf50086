/// Transactional email dispatch
///
/// Callers hand over a recipient, a subject and an already-rendered HTML
/// body. [`HttpEmailSender`] posts that to a managed provider's JSON API;
/// [`LogEmailSender`] only logs it and is used when no provider is
/// configured. There is no retry: a failed send is reported to the caller.
///
/// # Example
///
/// ```no_run
/// use taskmate_shared::email::{EmailMessage, EmailSender, HttpEmailSender};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sender = HttpEmailSender::new(
///     "https://api.mail.example/v1/send",
///     "secret-key",
///     "Taskmate <noreply@taskmate.app>",
/// )?;
///
/// sender.send(EmailMessage {
///     to: "ada@example.com".to_string(),
///     subject: "Hello".to_string(),
///     html: "<p>Hi!</p>".to_string(),
/// }).await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A pre-rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email provider unreachable: {0}")]
    Transport(String),

    #[error("Email provider rejected message (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Email sender misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError>;
}

/// Sends through a provider's HTTP API with a bearer key
pub struct HttpEmailSender {
    endpoint: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl fmt::Debug for HttpEmailSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEmailSender")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Serialize)]
struct ProviderPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailSender {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("taskmate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| EmailError::Config(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            from: from.into(),
            client,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ProviderPayload {
                from: &self.from,
                to: [&message.to],
                subject: &message.subject,
                html: &message.html,
            })
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        tracing::info!(subject = %message.subject, "Email sent");
        Ok(())
    }
}

/// Development sender: logs instead of sending
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            html = %message.html,
            "Email not sent (no provider configured)"
        );
        Ok(())
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(max_chars).collect::<String>())
    }
}

pub fn magic_link_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Your Taskmate sign-in link".to_string(),
        html: format!(
            "<p>Click the link below to sign in to Taskmate.</p>\
             <p><a href=\"{link}\">Sign in</a></p>\
             <p>The link expires shortly and can be used once.</p>"
        ),
    }
}

pub fn password_reset_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your Taskmate password".to_string(),
        html: format!(
            "<p>Someone asked to reset your Taskmate password.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>If this wasn't you, ignore this email.</p>"
        ),
    }
}

pub fn verify_email_email(to: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your Taskmate email".to_string(),
        html: format!(
            "<p>Welcome to Taskmate!</p>\
             <p><a href=\"{link}\">Verify your email address</a></p>"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let sender = HttpEmailSender::new("https://mail.example/send", "sk_live_123", "a@b.c").unwrap();
        let debug = format!("{:?}", sender);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("sk_live_123"));
    }

    #[test]
    fn test_bodies_contain_link() {
        let link = "http://localhost:3000/auth/reset?token=abc";
        let email = password_reset_email("ada@example.com", link);
        assert_eq!(email.to, "ada@example.com");
        assert!(email.html.contains(link));

        assert!(magic_link_email("a@b.c", "L1").html.contains("href=\"L1\""));
        assert!(verify_email_email("a@b.c", "L2").html.contains("href=\"L2\""));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn test_log_sender_never_fails() {
        let result = LogEmailSender
            .send(EmailMessage {
                to: "a@b.c".into(),
                subject: "s".into(),
                html: "<p/>".into(),
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let sender = HttpEmailSender::new("http://127.0.0.1:9/send", "k", "a@b.c").unwrap();
        let err = sender
            .send(EmailMessage {
                to: "a@b.c".into(),
                subject: "s".into(),
                html: "<p/>".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::Transport(_)));
    }
}
