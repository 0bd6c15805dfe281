use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Decimal length of a real Telegram chat id, used to tell ids from positions
const CHAT_ID_DIGITS: usize = 8;

/// Ordered list of chats allowed to command the bot.
///
/// Insertion order is preserved and duplicates are kept: `add` never rejects.
pub struct AuthorizationStore {
    chats: Mutex<Vec<i64>>,
}

impl AuthorizationStore {
    pub fn new(chats: Vec<i64>) -> Self {
        Self {
            chats: Mutex::new(chats),
        }
    }

    /// Parse the comma-joined form kept in the store. Bad entries are skipped.
    pub fn from_line(line: &str) -> Self {
        let chats = line
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Skipping malformed allowed chat entry: {:?}", entry);
                    None
                }
            })
            .collect();
        Self::new(chats)
    }

    pub async fn to_line(&self) -> String {
        let chats = self.chats.lock().await;
        chats
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub async fn add(&self, id: i64) {
        let mut chats = self.chats.lock().await;
        chats.push(id);
        info!("Adding chat: {}", id);
        debug!("Current allowed chats: {:?}", *chats);
    }

    /// Remove by position when `selector` indexes the list, otherwise by value
    /// when it looks like a full chat id.
    pub async fn remove(&self, selector: &str) -> bool {
        let Ok(value) = selector.trim().parse::<i64>() else {
            warn!("Failed to remove chat: invalid parameter {:?}", selector);
            return false;
        };

        let mut chats = self.chats.lock().await;
        if (0..chats.len() as i64).contains(&value) {
            let removed = chats.remove(value as usize);
            info!("Removed chat: {}", removed);
            return true;
        }

        if value.to_string().len() == CHAT_ID_DIGITS {
            if let Some(pos) = chats.iter().position(|&id| id == value) {
                chats.remove(pos);
                info!("Removed chat: {}", value);
                return true;
            }
        }

        warn!("Failed to remove chat: no match for {:?}", selector);
        false
    }

    pub async fn list(&self) -> Vec<i64> {
        self.chats.lock().await.clone()
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.chats.lock().await.contains(&id)
    }
}
