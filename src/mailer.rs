use anyhow::Context;
use axum::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

/// Outbound mail. Callers treat every send as best-effort: failures are
/// logged at the call site and never abort the surrounding operation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
    async fn send_to_admins(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    admin: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let builder = match (&config.smtp_username, &config.smtp_password) {
            (Some(user), Some(pass)) => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                    .context("smtp relay")?
                    .credentials(Credentials::new(user.clone(), pass.clone()))
            }
            // Local/dev relay without TLS or credentials
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host),
        };
        let transport = builder.port(config.smtp_port).build();

        Ok(Self {
            transport,
            from: config.from_email.parse().context("MAIL_FROM address")?,
            admin: config.admin_email.parse().context("MAIL_ADMIN address")?,
        })
    }

    async fn deliver(&self, to: Mailbox, subject: &str, body: &str) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
            .context("build message")?;
        self.transport.send(message).await.context("smtp send")?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let to: Mailbox = to.parse().context("recipient address")?;
        self.deliver(to, subject, body).await
    }

    async fn send_to_admins(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        self.deliver(self.admin.clone(), subject, body).await
    }
}
