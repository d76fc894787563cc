//! Notification sinks: a tracing-backed log sink and a Discord-compatible
//! webhook sink.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;

use feedwatch_core::{DeliveryError, Item, Payload};
use feedwatch_engine::NotificationSink;
use feedwatch_sources::http;

const POST_COLOUR: u32 = 0x1DA1F2;
const VIDEO_COLOUR: u32 = 0xFF0000;
const EVENT_COLOUR: u32 = 0x9B59B6;

/// Embed field limits enforced by the webhook API.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;

// ─── Log Sink ────────────────────────────────────────────────────────

/// Writes each item as an `info` event. Never fails.
pub struct LogSink {
    source_id: String,
    offset: FixedOffset,
}

impl LogSink {
    pub fn new(source_id: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            source_id: source_id.into(),
            offset,
        }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, item: &Item) -> Result<(), DeliveryError> {
        tracing::info!(
            target: "feedwatch::notice",
            source = %self.source_id,
            key = %item.key,
            "{}",
            render_line(item, self.offset)
        );
        Ok(())
    }
}

/// One-line rendering for logs and terminals.
pub(crate) fn render_line(item: &Item, offset: FixedOffset) -> String {
    match &item.payload {
        Payload::Post {
            author, text, url, ..
        } => format!("[post] {author}: {} <{url}>", single_line(text)),
        Payload::Video {
            channel,
            title,
            url,
            ..
        } => format!("[video] {channel}: {title} <{url}>"),
        Payload::Event {
            performer,
            title,
            starts_at,
        } => format!(
            "[event] {} | {performer} - {title}",
            local_time(*starts_at, offset)
        ),
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Webhook Sink ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct WebhookMessage {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Footer {
    pub text: String,
}

/// Posts one embed per item to a chat webhook URL.
pub struct WebhookSink {
    client: Client,
    url: String,
    offset: FixedOffset,
}

impl WebhookSink {
    pub fn new(client: Client, url: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            client,
            url: url.into(),
            offset,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, item: &Item) -> Result<(), DeliveryError> {
        let message = WebhookMessage {
            embeds: vec![render_embed(item, self.offset)],
        };
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DeliveryError::permanent(format!("invalid webhook request: {e}"))
                } else {
                    DeliveryError::transient(format!("webhook request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = http::retry_after(response.headers(), Utc::now());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unreadable error body".to_string());
        Err(DeliveryError::from_status(
            status.as_u16(),
            truncate(body.trim(), 300),
            retry_after,
        ))
    }
}

pub(crate) fn render_embed(item: &Item, offset: FixedOffset) -> Embed {
    match &item.payload {
        Payload::Post {
            author,
            text,
            url,
            created_at,
        } => Embed {
            title: truncate(&format!("New post from {author}"), TITLE_LIMIT),
            description: Some(truncate(text, DESCRIPTION_LIMIT)),
            url: Some(url.clone()),
            color: POST_COLOUR,
            footer: Some(Footer {
                text: match created_at {
                    Some(at) => format!("Posted {}", local_time(*at, offset)),
                    None => format!("Seen {}", local_time(item.observed_at, offset)),
                },
            }),
            timestamp: created_at.map(rfc3339),
        },
        Payload::Video {
            channel,
            title,
            url,
            published_at,
        } => Embed {
            title: truncate(title, TITLE_LIMIT),
            description: Some(format!("New video from {channel}")),
            url: Some(url.clone()),
            color: VIDEO_COLOUR,
            footer: Some(Footer {
                text: format!("Published {}", local_time(*published_at, offset)),
            }),
            timestamp: Some(rfc3339(*published_at)),
        },
        Payload::Event {
            performer,
            title,
            starts_at,
        } => Embed {
            title: truncate(&format!("{performer}: {title}"), TITLE_LIMIT),
            description: Some(format!("Starts {}", local_time(*starts_at, offset))),
            url: None,
            color: EVENT_COLOUR,
            footer: Some(Footer {
                text: "Broadcast schedule".to_string(),
            }),
            timestamp: Some(rfc3339(*starts_at)),
        },
    }
}

fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M (UTC%:z)")
        .to_string()
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}
