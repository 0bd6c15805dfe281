use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::remind::parse_reminder;
use super::{Command, CommandKind, CommandTable};
use crate::auth::AuthorizationStore;
use crate::camera::Camera;
use crate::platform::{Messenger, CONSOLE_SOURCE};
use crate::runtime::ShutdownSignal;
use crate::scheduler::{RoutineScheduler, RoutineSelector};

pub const INVALID_INPUT: &str = "Invalid input";
const INVALID_VALUE: &str = "Invalid value";
const INTERNAL_FAILURE: &str = "An internal error occurred";
/// Minimum length of a chat id accepted by `add`
const MIN_CHAT_ID_LEN: usize = 7;

/// Turns text from either channel into exactly one reply on that channel
pub struct CommandRouter {
    table: CommandTable,
    allowed: Arc<AuthorizationStore>,
    routines: Arc<RoutineScheduler>,
    messenger: Messenger,
    camera: Arc<dyn Camera>,
    shutdown: ShutdownSignal,
}

impl CommandRouter {
    pub fn new(
        table: CommandTable,
        allowed: Arc<AuthorizationStore>,
        routines: Arc<RoutineScheduler>,
        messenger: Messenger,
        camera: Arc<dyn Camera>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            table,
            allowed,
            routines,
            messenger,
            camera,
            shutdown,
        }
    }

    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    pub fn help_lines(&self) -> String {
        self.table.help()
    }

    /// Console input is always trusted; remote chats must be on the list
    pub async fn is_authorized(&self, source: i64) -> bool {
        source == CONSOLE_SOURCE || self.allowed.contains(source).await
    }

    /// Parse, dispatch and deliver the reply to `source`
    pub async fn handle(&self, text: &str, source: i64) {
        let command = Command::parse(text, source);
        let reply = self.dispatch(&command).await;
        self.reply_to(source, &reply).await;
    }

    /// Execute a command and return its reply. Never fails.
    pub async fn dispatch(&self, command: &Command) -> String {
        debug!("Received command: {:?}", command);
        let Some(kind) = self.table.lookup(&command.keyword) else {
            return INVALID_INPUT.to_string();
        };

        match self.execute(kind, command).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Command '{}' failed: {:#}", command.keyword, e);
                INTERNAL_FAILURE.to_string()
            }
        }
    }

    async fn execute(&self, kind: CommandKind, command: &Command) -> Result<String> {
        match kind {
            CommandKind::Help => Ok(format!("HELP:\n{}", self.table.help())),
            CommandKind::AddMe => self.request_access(command.source).await,
            CommandKind::Add => self.add_allowed_chat(command).await,
            CommandKind::Remove => self.remove_allowed_chat(command).await,
            CommandKind::List => Ok(format!("{:?}", self.allowed.list().await)),
            CommandKind::Remind => self.set_reminder(command).await,
            CommandKind::Routines => Ok(self.routines.describe().await),
            CommandKind::Cancel => self.cancel_routine(command).await,
            CommandKind::Capture => self.capture_image(command).await,
            CommandKind::Security => self.security_system(command).await,
            CommandKind::PowerOff => self.power_off().await,
        }
    }

    async fn reply_to(&self, source: i64, text: &str) {
        if source > 0 {
            self.messenger.send_text(source, text).await;
        } else {
            println!("{}", text);
        }
    }

    /// Tell every allowed chat, the log and the console
    async fn announce(&self, text: &str) {
        self.messenger.broadcast_text(text).await;
        info!("{}", text);
        println!("{}", text);
    }

    async fn request_access(&self, source: i64) -> Result<String> {
        if self.is_authorized(source).await {
            return Ok(INVALID_INPUT.to_string());
        }
        self.announce(&format!(
            "Chat '{}' requested to be enabled to use the bot",
            source
        ))
        .await;
        Ok("Your request has been submitted".to_string())
    }

    async fn add_allowed_chat(&self, command: &Command) -> Result<String> {
        let chat = command.first_arg().unwrap_or_default();
        if chat.len() < MIN_CHAT_ID_LEN {
            warn!("Invalid chat id: different digits number");
            return Ok("Invalid input: there are not enough digits".to_string());
        }

        let Ok(chat_id) = chat.parse::<i64>() else {
            warn!("Invalid chat id: {:?}", chat);
            return Ok("Invalid input value".to_string());
        };

        self.allowed.add(chat_id).await;
        self.messenger
            .send_text(chat_id, "You have been added to the allowed chats")
            .await;
        Ok("Successfully added to allowed chats".to_string())
    }

    async fn remove_allowed_chat(&self, command: &Command) -> Result<String> {
        let selector = command.first_arg().unwrap_or_default();
        if self.allowed.remove(selector).await {
            Ok("Successfully removed from allowed chats".to_string())
        } else {
            Ok(INVALID_VALUE.to_string())
        }
    }

    async fn set_reminder(&self, command: &Command) -> Result<String> {
        match parse_reminder(&command.args) {
            Ok(reminder) => {
                self.routines
                    .schedule_reminder(reminder, self.messenger.clone())
                    .await;
                Ok("Successfully set the telegram reminder".to_string())
            }
            Err(e) => {
                warn!("An error has occurred while setting a reminder: {:#}", e);
                Ok(INVALID_VALUE.to_string())
            }
        }
    }

    async fn cancel_routine(&self, command: &Command) -> Result<String> {
        let Some(selector) = command.first_arg() else {
            return Ok(INVALID_VALUE.to_string());
        };
        if self.routines.remove(&RoutineSelector::parse(selector)).await {
            Ok("Successfully removed the routine".to_string())
        } else {
            Ok(INVALID_VALUE.to_string())
        }
    }

    async fn capture_image(&self, command: &Command) -> Result<String> {
        let target = match command.first_arg() {
            Some(chat) => match chat.parse::<i64>() {
                Ok(chat_id) => Some(chat_id),
                Err(_) => return Ok(INVALID_VALUE.to_string()),
            },
            None => None,
        };

        let shot = match self.camera.last_shot().await {
            Ok(Some(shot)) => shot,
            Ok(None) => return Ok("No picture available".to_string()),
            Err(e) => {
                warn!("An error occurred while taking a photo: {:#}", e);
                return Ok("No picture available".to_string());
            }
        };

        match target {
            Some(chat_id) => {
                if self.messenger.send_image(chat_id, &shot).await {
                    Ok("Successfully sent picture".to_string())
                } else {
                    Ok(INVALID_VALUE.to_string())
                }
            }
            None => {
                self.messenger.broadcast_image(&shot).await;
                Ok("Successfully broadcasted picture".to_string())
            }
        }
    }

    async fn security_system(&self, command: &Command) -> Result<String> {
        let Some(status) = command.first_arg() else {
            return Ok(INVALID_VALUE.to_string());
        };
        let enable = status.eq_ignore_ascii_case("on");

        if let Err(e) = self.camera.set_motion_detection(enable).await {
            warn!("Failed to switch the security system: {:#}", e);
            return Ok("Failed to switch the security system".to_string());
        }

        Ok(if enable {
            "Security system enabled".to_string()
        } else {
            "Security system disabled".to_string()
        })
    }

    async fn power_off(&self) -> Result<String> {
        self.messenger.broadcast_text("Bot is now offline").await;
        info!("Power off requested");
        self.shutdown.request();
        Ok("Shutting down".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::testing::MockCamera;
    use crate::platform::testing::MockTransport;
    use crate::runtime::Switch;
    use chrono::{Local, NaiveDate};
    use std::collections::HashMap;
    use std::time::Duration;

    const ADMIN: i64 = 11111111;
    const STRANGER: i64 = 99999999;

    struct Harness {
        router: CommandRouter,
        transport: Arc<MockTransport>,
        allowed: Arc<AuthorizationStore>,
        routines: Arc<RoutineScheduler>,
        camera: Arc<MockCamera>,
        shutdown: ShutdownSignal,
    }

    fn harness_with_camera(camera: MockCamera) -> Harness {
        let transport = Arc::new(MockTransport::new());
        let allowed = Arc::new(AuthorizationStore::new(vec![ADMIN]));
        let routines = Arc::new(RoutineScheduler::new(
            Switch::new(),
            Duration::from_millis(10),
            0,
        ));
        let camera = Arc::new(camera);
        let shutdown = ShutdownSignal::new();
        let router = CommandRouter::new(
            CommandTable::build(&HashMap::new()).unwrap(),
            allowed.clone(),
            routines.clone(),
            Messenger::new(transport.clone(), allowed.clone()),
            camera.clone(),
            shutdown.clone(),
        );
        Harness {
            router,
            transport,
            allowed,
            routines,
            camera,
            shutdown,
        }
    }

    fn harness() -> Harness {
        harness_with_camera(MockCamera::default())
    }

    async fn run(h: &Harness, text: &str, source: i64) -> String {
        h.router.dispatch(&Command::parse(text, source)).await
    }

    #[tokio::test]
    async fn test_unknown_keyword_is_invalid_input() {
        let h = harness();
        assert_eq!(run(&h, "foobar", 0).await, "Invalid input");
        assert_eq!(run(&h, "", 0).await, "Invalid input");
        assert_eq!(h.allowed.list().await, vec![ADMIN]);
        assert_eq!(h.routines.len().await, 0);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_is_case_insensitive() {
        let h = harness();
        let reply = run(&h, "HeLp", ADMIN).await;
        assert!(reply.starts_with("HELP:\nhelp - "));
        assert!(reply.contains("poweroff - "));
    }

    #[tokio::test]
    async fn test_add_then_list_appends_at_tail() {
        let h = harness();
        assert_eq!(
            run(&h, "add 1234567", 0).await,
            "Successfully added to allowed chats"
        );
        assert_eq!(run(&h, "list", 0).await, "[11111111, 1234567]");
        assert_eq!(
            h.transport.sent_to(1234567),
            vec!["You have been added to the allowed chats"]
        );
    }

    #[tokio::test]
    async fn test_add_validation() {
        let h = harness();
        assert_eq!(
            run(&h, "add 123456", 0).await,
            "Invalid input: there are not enough digits"
        );
        assert_eq!(
            run(&h, "add", 0).await,
            "Invalid input: there are not enough digits"
        );
        assert_eq!(run(&h, "add 1234abc", 0).await, "Invalid input value");
        assert_eq!(h.allowed.list().await, vec![ADMIN]);
    }

    #[tokio::test]
    async fn test_remove_by_position_and_failure() {
        let h = harness();
        h.allowed.add(22222222).await;
        h.allowed.add(33333333).await;

        assert_eq!(
            run(&h, "remove 0", 0).await,
            "Successfully removed from allowed chats"
        );
        assert_eq!(h.allowed.list().await, vec![22222222, 33333333]);
        assert_eq!(run(&h, "remove 99", 0).await, "Invalid value");
        assert_eq!(run(&h, "remove", 0).await, "Invalid value");
        assert_eq!(h.allowed.list().await, vec![22222222, 33333333]);
    }

    #[tokio::test]
    async fn test_addme_from_stranger_notifies_admins() {
        let h = harness();
        assert_eq!(
            run(&h, "addme", STRANGER).await,
            "Your request has been submitted"
        );
        assert_eq!(
            h.transport.sent_to(ADMIN),
            vec!["Chat '99999999' requested to be enabled to use the bot"]
        );
        assert!(!h.allowed.contains(STRANGER).await);
    }

    #[tokio::test]
    async fn test_addme_when_already_authorized_is_invalid() {
        let h = harness();
        assert_eq!(run(&h, "addme", ADMIN).await, "Invalid input");
        assert_eq!(run(&h, "addme", 0).await, "Invalid input");
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_remind_with_blank_chat_broadcasts_when_fired() {
        let h = harness();
        let reply = run(&h, "remind r1 01/01/30 10:00:00  hello world", 0).await;
        assert_eq!(reply, "Successfully set the telegram reminder");

        let pending = h.routines.pending_reminders().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "r1");
        assert_eq!(
            pending[0].trigger_time,
            NaiveDate::from_ymd_opt(2030, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
        assert_eq!(pending[0].chat_id, None);

        // Authorized set at fire time is what counts
        h.allowed.add(22222222).await;
        let fire_at = pending[0].trigger_time;
        assert_eq!(h.routines.tick(fire_at).await, 1);
        assert_eq!(h.transport.sent_to(ADMIN), vec!["hello world"]);
        assert_eq!(h.transport.sent_to(22222222), vec!["hello world"]);
        assert_eq!(h.routines.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_remind_creates_nothing() {
        let h = harness();
        assert_eq!(
            run(&h, "remind r1 31/02/30 10:00:00  hi", 0).await,
            "Invalid value"
        );
        assert_eq!(run(&h, "remind r1 01/01/30", 0).await, "Invalid value");
        assert_eq!(
            run(&h, "remind r1 01/01/30 10:00 12345678", 0).await,
            "Invalid value"
        );
        assert_eq!(h.routines.len().await, 0);
    }

    #[tokio::test]
    async fn test_routines_listing() {
        let h = harness();
        assert_eq!(run(&h, "routines", 0).await, "no routines");
        run(&h, "remind water 01/01/30 08:00 12345678 plants", 0).await;
        assert_eq!(run(&h, "routines", 0).await, "Routines:\nwater");
    }

    #[tokio::test]
    async fn test_cancel_by_name_and_position() {
        let h = harness();
        run(&h, "remind a 01/01/30 08:00  one", 0).await;
        run(&h, "remind b 01/01/30 09:00  two", 0).await;
        run(&h, "remind c 01/01/30 10:00  three", 0).await;

        assert_eq!(run(&h, "cancel b", 0).await, "Successfully removed the routine");
        assert_eq!(run(&h, "cancel 0", 0).await, "Successfully removed the routine");
        assert_eq!(h.routines.names().await, vec!["c"]);
        assert_eq!(run(&h, "cancel 5", 0).await, "Invalid value");
        assert_eq!(run(&h, "cancel", 0).await, "Invalid value");
    }

    #[tokio::test]
    async fn test_capture_sends_or_broadcasts() {
        let h = harness_with_camera(MockCamera::with_frame(vec![1, 2, 3, 4]));
        assert_eq!(
            run(&h, "capture 12345678", 0).await,
            "Successfully sent picture"
        );
        assert_eq!(
            run(&h, "capture", 0).await,
            "Successfully broadcasted picture"
        );
        assert_eq!(h.transport.images(), vec![(12345678, 4), (ADMIN, 4)]);
        assert_eq!(run(&h, "capture nope", 0).await, "Invalid value");
    }

    #[tokio::test]
    async fn test_capture_without_frame() {
        let h = harness();
        assert_eq!(run(&h, "capture", 0).await, "No picture available");
        assert!(h.transport.images().is_empty());
    }

    #[tokio::test]
    async fn test_security_toggle() {
        let h = harness();
        assert_eq!(run(&h, "security ON", 0).await, "Security system enabled");
        assert!(h.camera.motion_detection());
        assert_eq!(run(&h, "security off", 0).await, "Security system disabled");
        assert!(!h.camera.motion_detection());
        assert_eq!(run(&h, "security", 0).await, "Invalid value");
    }

    #[tokio::test]
    async fn test_poweroff_broadcasts_and_requests_shutdown() {
        let h = harness();
        assert!(!h.shutdown.is_requested());
        assert_eq!(run(&h, "poweroff", 0).await, "Shutting down");
        assert_eq!(h.transport.sent_to(ADMIN), vec!["Bot is now offline"]);
        assert!(h.shutdown.is_requested());
    }

    #[tokio::test]
    async fn test_handle_routes_reply_to_remote_source() {
        let h = harness();
        h.router.handle("list", ADMIN).await;
        assert_eq!(h.transport.sent_to(ADMIN), vec!["[11111111]"]);

        // Console replies are printed, not sent
        h.router.handle("list", 0).await;
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_touch_clock() {
        // Past-due reminders are accepted and fire on the next tick
        let h = harness();
        run(&h, "remind old 01/01/20 00:00:00 12345678 late", 0).await;
        assert_eq!(h.routines.tick(Local::now().naive_local()).await, 1);
        assert_eq!(h.transport.sent_to(12345678), vec!["late"]);
    }
}
