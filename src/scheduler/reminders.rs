use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{RoutineAction, RoutineFuture, RoutineId, RoutineScheduler};
use crate::platform::Messenger;

/// Store key under which pending reminders are saved on shutdown
pub const REMINDERS_KEY: &str = "routines";

/// A chat reminder. `chat_id: None` broadcasts to every chat allowed at
/// the moment it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub name: String,
    pub trigger_time: NaiveDateTime,
    pub chat_id: Option<i64>,
    pub message: String,
}

impl Reminder {
    async fn deliver(&self, messenger: &Messenger) -> Result<()> {
        match self.chat_id {
            Some(chat_id) => {
                if !messenger.send_text(chat_id, &self.message).await {
                    anyhow::bail!("Reminder '{}' not delivered to chat {}", self.name, chat_id);
                }
            }
            None => {
                // Partial delivery counts as done; retrying would repeat it
                // to the chats that already got it
                let delivery = messenger.broadcast_text(&self.message).await;
                if delivery.is_total_failure() {
                    anyhow::bail!(
                        "Reminder '{}' not delivered to any of {} chats",
                        self.name,
                        delivery.recipients
                    );
                }
            }
        }
        Ok(())
    }
}

impl RoutineScheduler {
    /// Register a reminder routine that sends its message through `messenger`
    pub async fn schedule_reminder(&self, reminder: Reminder, messenger: Messenger) -> RoutineId {
        let bound = Arc::new(reminder.clone());
        let action: RoutineAction = Arc::new(move || -> RoutineFuture {
            let reminder = bound.clone();
            let messenger = messenger.clone();
            Box::pin(async move { reminder.deliver(&messenger).await })
        });

        info!("Reminder {} set for {}", reminder.name, reminder.trigger_time);
        self.insert(
            &reminder.name,
            reminder.trigger_time,
            false,
            action,
            Some(reminder.clone()),
        )
        .await
    }
}
