use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, UpdateKind};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use super::{ChatTransport, IncomingMessage, RemoteUpdate, TransportError};

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Map teloxide failures onto the controller's fault taxonomy
fn classify(err: RequestError) -> TransportError {
    match err {
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        RequestError::Io(e) => TransportError::Network(e.to_string()),
        RequestError::RetryAfter(secs) => {
            TransportError::Network(format!("rate limited, retry after {:?}", secs))
        }
        RequestError::Api(ApiError::InvalidToken) => TransportError::InvalidCredential,
        RequestError::Api(
            api @ (ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation),
        ) => TransportError::PeerUnauthorized(api.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

/// Headroom between the server-side long poll and the HTTP request timeout
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

fn client_timeout(poll_timeout: Duration) -> Duration {
    poll_timeout + CLIENT_TIMEOUT_MARGIN
}

/// Telegram Bot API transport using manual long polling.
///
/// The HTTP client is built with a request timeout longer than the poll
/// timeout, so a quiet long poll ends on the server side first.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str, poll_timeout: Duration) -> anyhow::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(client_timeout(poll_timeout))
            .build()
            .context("Failed to build Telegram HTTP client")?;
        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn identify(&self) -> Result<String, TransportError> {
        let me = self.bot.get_me().await.map_err(classify)?;
        Ok(me.user.username.clone().unwrap_or_else(|| me.user.first_name.clone()))
    }

    async fn fetch_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<RemoteUpdate>, TransportError> {
        let mut request = self.bot.get_updates().timeout(timeout.as_secs() as u32);
        if let Some(offset) = offset {
            request = request.offset(offset as i32);
        }

        let updates = request.await.map_err(classify)?;
        debug!("Fetched {} update(s)", updates.len());

        Ok(updates
            .into_iter()
            .map(|update| {
                let message = match &update.kind {
                    UpdateKind::Message(msg) => msg.text().map(|text| IncomingMessage {
                        chat_id: msg.chat.id.0,
                        user_name: msg
                            .from
                            .as_ref()
                            .map(|user| user.first_name.clone())
                            .unwrap_or_default(),
                        text: text.to_string(),
                    }),
                    _ => None,
                };
                RemoteUpdate {
                    update_id: update.id.0 as i64,
                    message,
                }
            })
            .collect())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, 4000) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .await
                .map_err(classify)?;
        }
        Ok(())
    }

    async fn send_image(&self, chat_id: i64, image: Vec<u8>) -> Result<(), TransportError> {
        self.bot
            .send_photo(ChatId(chat_id), InputFile::memory(image).file_name("snapshot.jpg"))
            .await
            .map_err(classify)?;
        Ok(())
    }
}
