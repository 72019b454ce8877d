// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound Telegram notifications.

use crate::config::Config;
use crate::error::AppError;
use crate::models::Release;
use async_trait::async_trait;
use serde_json::json;

/// Delivers messages to a chat.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Announce a new release.
    async fn send(&self, chat_id: i64, release: &Release) -> Result<(), AppError>;

    /// Send a plain-text message.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), AppError>;
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            bot_token: config.telegram_bot_token.clone(),
        }
    }

    /// POST a `sendMessage` call.
    async fn send_message(&self, body: serde_json::Value) -> Result<(), AppError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            // reqwest errors include the URL, which carries the bot token
            .map_err(|e| AppError::Messaging(e.without_url().to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Messaging(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl NotificationDispatcher for TelegramNotifier {
    async fn send(&self, chat_id: i64, release: &Release) -> Result<(), AppError> {
        self.send_message(json!({
            "chat_id": chat_id,
            "text": format_release(release),
            "parse_mode": "Markdown",
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "Open in Spotify", "url": release.url }
                ]]
            }
        }))
        .await
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        self.send_message(json!({ "chat_id": chat_id, "text": text }))
            .await
    }
}

/// Markdown message body for a release.
///
/// The trailing invisible link makes Telegram render a preview: the cover art
/// when there is one, else the album page.
pub fn format_release(release: &Release) -> String {
    format!(
        "*{}* · {}[ㅤ]({})",
        escape_markdown(&release.name),
        escape_markdown(&release.artist_names()),
        release.image_url.as_deref().unwrap_or(&release.url)
    )
}

/// Escape characters that are special in Telegram's legacy Markdown.
pub fn escape_markdown(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
