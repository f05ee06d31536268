//! Telegram Bot API client using raw reqwest (no framework).
//!
//! Uses long-polling via `getUpdates` and sends replies via `sendMessage`.
//! Authorization is not decided here; every text message is forwarded and the
//! daemon's guard decides what to do with it.

use super::{Channel, ChannelEvent, OutboundMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

/// Maximum message length for Telegram (we chunk below this).
const MAX_MESSAGE_LEN: usize = 4000;

/// Telegram Bot API client.
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
}

// --- Telegram API response types ---

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    from: Option<TgUser>,
    /// Unix seconds.
    date: i64,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .wrap_err("failed to build HTTP client")?;

        Ok(Self { bot_token, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// Parse a message into a ChannelEvent.
    fn parse_message(msg: &TgMessage) -> Option<ChannelEvent> {
        let text = msg.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }

        let user_name = msg
            .from
            .as_ref()
            .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()))
            .unwrap_or_default();
        let sent_at = DateTime::<Utc>::from_timestamp(msg.date, 0)?;

        if let Some(rest) = text.strip_prefix('/') {
            let command = rest.split_whitespace().next().unwrap_or_default();
            // Strip @botname suffix from commands like "/start@mybot"
            let command = command.split('@').next().unwrap_or(command);
            Some(ChannelEvent::Command {
                chat_id: msg.chat.id,
                user_name,
                command: command.to_owned(),
                sent_at,
            })
        } else {
            Some(ChannelEvent::Message {
                chat_id: msg.chat.id,
                user_name,
                text: text.to_owned(),
                sent_at,
            })
        }
    }

    /// Long-poll for updates from Telegram.
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>> {
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "30".to_string()),
            ])
            .send()
            .await?;

        let body: TgResponse<Vec<TgUpdate>> = resp.json().await?;

        if !body.ok {
            let desc = body.description.unwrap_or_default();
            color_eyre::eyre::bail!("Telegram API error: {desc}");
        }

        Ok(body.result.unwrap_or_default())
    }

    /// Send plain text, chunking if necessary.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        for chunk in chunk_message(text) {
            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&serde_json::json!({
                    "chat_id": chat_id,
                    "text": chunk,
                }))
                .send()
                .await?;

            let body: TgResponse<serde_json::Value> = resp.json().await?;
            if !body.ok {
                let desc = body.description.unwrap_or_default();
                color_eyre::eyre::bail!("sendMessage failed: {desc}");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn run(&self, tx: Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut offset: i64 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let updates = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.get_updates(offset) => {
                    match result {
                        Ok(updates) => updates,
                        Err(e) => {
                            tracing::warn!(error = %e, "telegram poll failed");
                            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                            continue;
                        }
                    }
                }
            };

            for update in updates {
                offset = update.update_id + 1;

                let Some(msg) = update.message else {
                    continue;
                };

                if let Some(event) = Self::parse_message(&msg)
                    && tx.send(event).await.is_err()
                {
                    // Receiver dropped; shut down.
                    return;
                }
            }
        }
    }

    async fn send_message(&self, msg: &OutboundMessage) -> Result<()> {
        self.send_text(msg.chat_id, &msg.text).await
    }
}

/// Split a message into chunks that fit within Telegram's limit.
fn chunk_message(text: &str) -> Vec<&str> {
    if text.len() <= MAX_MESSAGE_LEN {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= MAX_MESSAGE_LEN {
            chunks.push(remaining);
            break;
        }

        let mut limit = MAX_MESSAGE_LEN;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        // Try to split at a newline within the limit. A leading newline
        // would leave an empty chunk, which Telegram rejects.
        let split_at = remaining[..limit]
            .rfind('\n')
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk);
        // Skip the newline we split on.
        remaining = rest.strip_prefix('\n').unwrap_or(rest);
    }

    chunks
}
