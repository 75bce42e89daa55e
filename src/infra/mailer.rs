//! Outbound mail.
//!
//! The registration and password flows dispatch mail synchronously, so
//! the trait is the seam tests and local runs swap out. When SMTP is
//! not configured the process falls back to logging the message, which
//! keeps the flows usable in development.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::errors::{AppError, AppResult};

/// Outbound mail dispatch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// SMTP transport via lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build from SMTP_* environment variables; `None` if SMTP_HOST or
    /// SMTP_FROM is absent or unparseable.
    pub fn from_env() -> Option<Self> {
        let host = env::var("SMTP_HOST").ok()?;
        let from: Mailbox = env::var("SMTP_FROM").ok()?.parse().ok()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&host).ok()?;
        if let Some(port) = env::var("SMTP_PORT").ok().and_then(|p| p.parse().ok()) {
            builder = builder.port(port);
        }
        if let (Ok(username), Ok(password)) = (env::var("SMTP_USERNAME"), env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Some(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|_| AppError::validation("Invalid recipient address"))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| AppError::internal(format!("Failed to build message: {}", e)))?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!(error = %e, "mail dispatch failed");
            AppError::DispatchFailed
        })?;

        tracing::debug!(to = %to, subject = %subject, "mail dispatched");
        Ok(())
    }
}

/// Development fallback: logs instead of sending.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(to = %to, subject = %subject, body = %body, "mail (not sent, SMTP unconfigured)");
        Ok(())
    }
}

/// Pick the SMTP mailer when configured, the logging one otherwise.
pub fn mailer_from_env() -> Arc<dyn Mailer> {
    match SmtpMailer::from_env() {
        Some(mailer) => {
            tracing::info!("using SMTP mail transport");
            Arc::new(mailer)
        }
        None => {
            tracing::warn!("SMTP not configured; outbound mail will be logged only");
            Arc::new(LogMailer)
        }
    }
}
