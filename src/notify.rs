//! Alert delivery.
//!
//! The dispatcher fans one message out to every configured channel. A broken
//! channel is logged and reported back; it never stops the others and never
//! changes the outcome of the analysis itself.

use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::{Duration, Instant};
use thiserror::Error;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
    fn channel_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl DispatchResult {
    pub fn success(&self) -> bool { self.error.is_none() }
}

#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn add(&mut self, channel: Box<dyn Notifier>) {
        self.channels.push(channel);
    }

    pub fn is_empty(&self) -> bool { self.channels.is_empty() }

    pub fn len(&self) -> usize { self.channels.len() }

    pub fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!("no notification channels configured");
            return Vec::new();
        }
        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let start = Instant::now();
            let outcome = channel.send(notification);
            let duration_ms = start.elapsed().as_millis() as u64;
            let error = match outcome {
                Ok(()) => {
                    tracing::info!(channel = channel.channel_name(), duration_ms, "notification delivered");
                    None
                }
                Err(e) => {
                    tracing::warn!(channel = channel.channel_name(), error = %e, duration_ms, "notification delivery failed");
                    Some(e.to_string())
                }
            };
            results.push(DispatchResult { channel: channel.channel_name().to_string(), error, duration_ms });
        }
        results
    }
}

/// `channel: error` lines for every failed delivery.
pub fn failures(results: &[DispatchResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.channel, e)))
        .collect()
}

fn http_client() -> Result<reqwest::blocking::Client, NotifyError> {
    Ok(reqwest::blocking::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// ntfy.sh-style push: `POST <server>/<topic>` with the title in a header.
pub struct NtfyNotifier {
    url: String,
    client: reqwest::blocking::Client,
}

impl NtfyNotifier {
    pub fn new(server: &str, topic: &str) -> Result<Self, NotifyError> {
        if topic.trim().is_empty() {
            return Err(NotifyError::Config("ntfy topic must not be empty".into()));
        }
        Ok(Self {
            url: format!("{}/{}", server.trim_end_matches('/'), topic),
            client: http_client()?,
        })
    }
}

impl Notifier for NtfyNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(url = %self.url, "sending ntfy notification");
        self.client
            .post(&self.url)
            .header("Title", notification.title.as_str())
            .body(notification.body.clone())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn channel_name(&self) -> &str { "ntfy" }
}

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self, NotifyError> {
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(NotifyError::Config("telegram needs both a bot token and a chat id".into()));
        }
        Ok(Self {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            client: http_client()?,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": notification.body,
            "disable_web_page_preview": true,
        });
        tracing::debug!(chat_id = %self.chat_id, "sending telegram notification");
        self.client.post(&url).json(&body).send()?.error_for_status()?;
        Ok(())
    }

    fn channel_name(&self) -> &str { "telegram" }
}

#[derive(Debug, Clone, Default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    pub starttls: bool,
}

pub struct EmailNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;
        let to: Mailbox = settings
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = if settings.starttls {
            SmtpTransport::starttls_relay(&settings.host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&settings.host)
        };
        builder = builder.port(settings.port).timeout(Some(SMTP_TIMEOUT));
        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(settings.username.clone(), settings.password.clone()));
        }
        Ok(Self { transport: builder.build(), from, to })
    }
}

impl Notifier for EmailNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notification.title.as_str())
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;
        self.transport.send(&email).map_err(|e| NotifyError::Smtp(e.to_string()))?;
        Ok(())
    }

    fn channel_name(&self) -> &str { "email" }
}
