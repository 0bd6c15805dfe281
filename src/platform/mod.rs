pub mod console;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::auth::AuthorizationStore;

/// Source id of the local console. It is implicitly authorized.
pub const CONSOLE_SOURCE: i64 = 0;

/// A text message received from the remote chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Chat the message came from; replies go back here
    pub chat_id: i64,
    /// Display name of the sender, for logs only
    pub user_name: String,
    pub text: String,
}

/// One long-poll result. Updates without a text message carry `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUpdate {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

/// Faults surfaced by a chat transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connectivity problem; the same request can be retried later
    #[error("network error: {0}")]
    Network(String),
    /// A peer blocked or removed the bot
    #[error("peer unauthorized: {0}")]
    PeerUnauthorized(String),
    #[error("invalid bot credential")]
    InvalidCredential,
    #[error("transport error: {0}")]
    Other(String),
}

/// The remote chat service the controller talks to
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Verify the credential and return the bot's handle
    async fn identify(&self) -> Result<String, TransportError>;

    /// Long-poll for updates with id >= `offset`, waiting at most `timeout`.
    async fn fetch_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<RemoteUpdate>, TransportError>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_image(&self, chat_id: i64, image: Vec<u8>) -> Result<(), TransportError>;
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub recipients: usize,
    pub delivered: usize,
}

impl Delivery {
    /// Nobody who should have received it did
    pub fn is_total_failure(&self) -> bool {
        self.recipients > 0 && self.delivered == 0
    }
}

/// Sends through the transport, swallowing per-chat failures into log lines,
/// and fans out to every currently authorized chat.
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn ChatTransport>,
    allowed: Arc<AuthorizationStore>,
}

impl Messenger {
    pub fn new(transport: Arc<dyn ChatTransport>, allowed: Arc<AuthorizationStore>) -> Self {
        Self { transport, allowed }
    }

    pub async fn send_text(&self, chat_id: i64, text: &str) -> bool {
        match self.transport.send_text(chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send message to chat {}: {}", chat_id, e);
                false
            }
        }
    }

    pub async fn send_image(&self, chat_id: i64, image: &[u8]) -> bool {
        match self.transport.send_image(chat_id, image.to_vec()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send photo to chat {}: {}", chat_id, e);
                false
            }
        }
    }

    pub async fn broadcast_text(&self, text: &str) -> Delivery {
        let chats = self.allowed.list().await;
        let mut delivered = 0;
        for chat in &chats {
            if self.send_text(*chat, text).await {
                delivered += 1;
            }
        }
        Delivery {
            recipients: chats.len(),
            delivered,
        }
    }

    pub async fn broadcast_image(&self, image: &[u8]) -> Delivery {
        let chats = self.allowed.list().await;
        let mut delivered = 0;
        for chat in &chats {
            if self.send_image(*chat, image).await {
                delivered += 1;
            }
        }
        Delivery {
            recipients: chats.len(),
            delivered,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;

    use super::*;

    /// Scripted transport that records everything sent through it
    #[derive(Default)]
    pub struct MockTransport {
        polls: Mutex<VecDeque<Result<Vec<RemoteUpdate>, TransportError>>>,
        offsets: Mutex<Vec<Option<i64>>>,
        sent: Mutex<Vec<(i64, String)>>,
        images: Mutex<Vec<(i64, usize)>>,
        failing_chats: Mutex<HashSet<i64>>,
        slow_chats: Mutex<HashMap<i64, Duration>>,
        invalid_credential: bool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_invalid_credential() -> Self {
            Self {
                invalid_credential: true,
                ..Self::default()
            }
        }

        /// Queue the result of the next poll
        pub fn push_poll(&self, result: Result<Vec<RemoteUpdate>, TransportError>) {
            self.polls.lock().unwrap().push_back(result);
        }

        pub fn fail_sends_to(&self, chat_id: i64) {
            self.failing_chats.lock().unwrap().insert(chat_id);
        }

        pub fn heal_sends_to(&self, chat_id: i64) {
            self.failing_chats.lock().unwrap().remove(&chat_id);
        }

        /// Texts to `chat_id` take `delay` before they are recorded
        pub fn slow_sends_to(&self, chat_id: i64, delay: Duration) {
            self.slow_chats.lock().unwrap().insert(chat_id, delay);
        }

        pub fn offsets(&self) -> Vec<Option<i64>> {
            self.offsets.lock().unwrap().clone()
        }

        pub fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|(chat, _)| *chat == chat_id)
                .map(|(_, text)| text)
                .collect()
        }

        pub fn images(&self) -> Vec<(i64, usize)> {
            self.images.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn identify(&self) -> Result<String, TransportError> {
            if self.invalid_credential {
                Err(TransportError::InvalidCredential)
            } else {
                Ok("mock_bot".to_string())
            }
        }

        async fn fetch_updates(
            &self,
            offset: Option<i64>,
            timeout: Duration,
        ) -> Result<Vec<RemoteUpdate>, TransportError> {
            self.offsets.lock().unwrap().push(offset);
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => {
                    tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
            if self.failing_chats.lock().unwrap().contains(&chat_id) {
                return Err(TransportError::Network("unreachable".to_string()));
            }
            let delay = self.slow_chats.lock().unwrap().get(&chat_id).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_image(&self, chat_id: i64, image: Vec<u8>) -> Result<(), TransportError> {
            if self.failing_chats.lock().unwrap().contains(&chat_id) {
                return Err(TransportError::Network("unreachable".to_string()));
            }
            self.images.lock().unwrap().push((chat_id, image.len()));
            Ok(())
        }
    }

    pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> RemoteUpdate {
        RemoteUpdate {
            update_id,
            message: Some(IncomingMessage {
                chat_id,
                user_name: "tester".to_string(),
                text: text.to_string(),
            }),
        }
    }
}
