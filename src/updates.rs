use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::AuthorizationStore;
use crate::commands::router::CommandRouter;
use crate::commands::CommandKind;
use crate::platform::{ChatTransport, IncomingMessage, TransportError};
use crate::runtime::Switch;

/// Reply sent to chats that are not allowed to use the bot
pub const REJECTION: &str = "This bot is classified, 'addme' to request the clearance";

/// Long-polls the chat platform and feeds authorized messages to the router.
pub struct UpdateConsumer {
    transport: Arc<dyn ChatTransport>,
    allowed: Arc<AuthorizationStore>,
    router: Arc<CommandRouter>,
    /// Next update id to ask for; `None` until the first update is seen
    cursor: Mutex<Option<i64>>,
    switch: Switch,
    poll_timeout: Duration,
    retry_backoff: Duration,
}

impl UpdateConsumer {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        allowed: Arc<AuthorizationStore>,
        router: Arc<CommandRouter>,
        switch: Switch,
        poll_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            allowed,
            router,
            cursor: Mutex::new(None),
            switch,
            poll_timeout,
            retry_backoff,
        }
    }

    pub async fn cursor(&self) -> Option<i64> {
        *self.cursor.lock().await
    }

    /// One poll cycle. Returns how many updates were received.
    pub async fn poll_once(&self) -> usize {
        let offset = self.cursor().await;
        let updates = match self.transport.fetch_updates(offset, self.poll_timeout).await {
            Ok(updates) => updates,
            Err(TransportError::PeerUnauthorized(reason)) => {
                // Skip the update that triggered it so it is not redelivered forever
                let mut cursor = self.cursor.lock().await;
                if let Some(next) = cursor.as_mut() {
                    *next += 1;
                }
                warn!("Skipping update from unauthorized peer: {}", reason);
                return 0;
            }
            Err(e) => {
                warn!("Polling failed, retrying in {:?}: {}", self.retry_backoff, e);
                tokio::time::sleep(self.retry_backoff).await;
                return 0;
            }
        };

        let received = updates.len();
        for update in updates {
            // Advance before dispatch: a crash mid-command must not replay it
            *self.cursor.lock().await = Some(update.update_id + 1);

            let Some(message) = update.message else {
                debug!("Ignoring update {} without a text message", update.update_id);
                continue;
            };
            self.handle_message(message).await;
        }
        received
    }

    async fn handle_message(&self, message: IncomingMessage) {
        let IncomingMessage {
            chat_id,
            user_name,
            text,
        } = message;
        debug!("Message from {} ({}): {}", user_name, chat_id, text);

        if self.allowed.contains(chat_id).await || self.is_access_request(&text) {
            self.router.handle(&text, chat_id).await;
            return;
        }

        warn!(
            "Rejected message from unauthorized chat {} ({}): {}",
            chat_id, user_name, text
        );
        if let Err(e) = self.transport.send_text(chat_id, REJECTION).await {
            warn!("Failed to send rejection to chat {}: {}", chat_id, e);
        }
    }

    fn is_access_request(&self, text: &str) -> bool {
        let keyword = text.trim().split(' ').next().unwrap_or_default();
        keyword.to_lowercase() == self.router.table().keyword(CommandKind::AddMe)
    }

    pub async fn run(self: Arc<Self>) {
        info!("Update consumer started");
        while self.switch.is_on() {
            self.poll_once().await;
        }
        info!("Update consumer stopped");
    }
}
