use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;

use crate::alert::engine::AlertEvent;
use crate::config::{AlertsConfig, EmailConfig};

const WEBHOOK_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, event: &AlertEvent) -> Result<()>;
}

pub struct StdoutSink;

#[async_trait]
impl AlertSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn send(&self, event: &AlertEvent) -> Result<()> {
        println!("[ALERT {}] {}\n{}", event.severity.as_str().to_uppercase(), event.title, event.body);
        Ok(())
    }
}

pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cms-watch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn is_discord(&self) -> bool {
        self.url.contains("discord.com/api/webhooks")
            || self.url.contains("discordapp.com/api/webhooks")
    }
}

/// Discord rejects `content` longer than 2000 characters.
fn discord_content(event: &AlertEvent) -> String {
    const DISCORD_LIMIT: usize = 2000;
    let content = format!(
        "[{}] {}\n{}",
        event.severity.as_str().to_uppercase(),
        event.title,
        event.body
    );
    if content.chars().count() <= DISCORD_LIMIT {
        return content;
    }
    let mut truncated: String = content.chars().take(DISCORD_LIMIT - 1).collect();
    truncated.push('…');
    truncated
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &AlertEvent) -> Result<()> {
        let req = if self.is_discord() {
            self.client
                .post(&self.url)
                .json(&serde_json::json!({ "content": discord_content(event) }))
        } else {
            self.client.post(&self.url).json(event)
        };

        req.send().await?.error_for_status()?;
        Ok(())
    }
}

pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSink {
    /// STARTTLS relay; the connection is only opened on send.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let host = config.smtp_host.trim();
        if host.is_empty() {
            bail!("email alerts enabled but alerts.email.smtp_host is empty");
        }
        if config.to.is_empty() {
            bail!("email alerts enabled but alerts.email.to lists no recipients");
        }
        let from: Mailbox = config
            .from
            .trim()
            .parse()
            .with_context(|| format!("invalid sender address: {:?}", config.from))?;
        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.trim()
                    .parse::<Mailbox>()
                    .with_context(|| format!("invalid recipient address: {addr:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("failed configuring SMTP relay {host}"))?
            .port(config.smtp_port);
        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    pub fn message(&self, event: &AlertEvent) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(format!("CMS Alert: {}", event.title))
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let body = format!(
            "CMS changes detected ({}):\n\n{}\n",
            event.severity.as_str().to_uppercase(),
            event.body
        );
        Ok(builder.body(body)?)
    }
}

#[async_trait]
impl AlertSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, event: &AlertEvent) -> Result<()> {
        self.transport
            .send(self.message(event)?)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

pub fn sinks_from_config(config: &AlertsConfig) -> Result<Vec<Box<dyn AlertSink>>> {
    let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
    if config.enable_stdout {
        sinks.push(Box::new(StdoutSink));
    }
    let url = config.webhook_url.trim();
    if !url.is_empty() {
        sinks.push(Box::new(WebhookSink::new(url)?));
    }
    if config.email.enabled {
        sinks.push(Box::new(EmailSink::new(&config.email)?));
    }
    Ok(sinks)
}
