use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::auth::AuthorizationStore;
use crate::camera::{Camera, SnapshotCamera};
use crate::commands::router::CommandRouter;
use crate::commands::CommandTable;
use crate::config::Config;
use crate::platform::console::{ConsoleInputPort, ControlPanel};
use crate::platform::telegram::TelegramTransport;
use crate::platform::{ChatTransport, Messenger};
use crate::scheduler::cron::CronScheduler;
use crate::scheduler::reminders::{Reminder, REMINDERS_KEY};
use crate::scheduler::tasks::register_maintenance_jobs;
use crate::scheduler::RoutineScheduler;
use crate::storage::Store;
use crate::updates::UpdateConsumer;

/// Store record holding the bot token (line 0) and the allowed chats (line 1)
const TELEGRAM_KEY: &str = "telegram";
const TOKEN_LINE: u32 = 0;
const ALLOWED_CHATS_LINE: u32 = 1;

/// Extra time given to loops on top of their longest blocking wait
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Cooperative on/off flag checked by a loop once per iteration
#[derive(Clone, Debug)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    /// A switch that starts on
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn turn_off(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets any component ask the controller to shut down
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    notify: Arc<Notify>,
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }
}

pub async fn persist_allowed_chats(store: &Store, allowed: &AuthorizationStore) -> Result<()> {
    let line = allowed.to_line().await;
    store
        .write_line(TELEGRAM_KEY, ALLOWED_CHATS_LINE, &line)
        .await
        .context("Failed to persist allowed chats")
}

/// Stored chats win; the config list only seeds a fresh store
async fn load_allowed_chats(store: &Store, config: &Config) -> Result<AuthorizationStore> {
    match store.read_line(TELEGRAM_KEY, ALLOWED_CHATS_LINE).await? {
        Some(line) => Ok(AuthorizationStore::from_line(&line)),
        None => {
            info!(
                "No stored allowed chats, seeding from config: {:?}",
                config.telegram.allowed_chat_ids
            );
            let allowed = AuthorizationStore::new(config.telegram.allowed_chat_ids.clone());
            persist_allowed_chats(store, &allowed).await?;
            Ok(allowed)
        }
    }
}

async fn resolve_token(store: &Store, config: &Config) -> Result<String> {
    if let Some(token) = store.read_line(TELEGRAM_KEY, TOKEN_LINE).await? {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    let token = config.telegram.bot_token.trim();
    if token.is_empty() {
        anyhow::bail!("No bot token stored or configured; run the setup binary first");
    }
    store.write_line(TELEGRAM_KEY, TOKEN_LINE, token).await?;
    info!("Bot token saved to store");
    Ok(token.to_string())
}

/// Owns every long-running part of the controller
pub struct Controller {
    store: Store,
    allowed: Arc<AuthorizationStore>,
    routines: Arc<RoutineScheduler>,
    camera: Arc<dyn Camera>,
    shutdown: ShutdownSignal,
    switches: Vec<Switch>,
    handles: Vec<JoinHandle<()>>,
    cron: CronScheduler,
    join_timeout: Duration,
    bot_name: String,
}

impl Controller {
    /// Start against the real Telegram API and snapshot camera
    pub async fn start(config: &Config) -> Result<Self> {
        let store = Store::open(&config.storage.database_path)?;
        let camera: Arc<dyn Camera> = Arc::new(SnapshotCamera::new(&config.camera));
        let poll_timeout = config.telegram.poll_timeout();
        Self::assemble(
            config,
            store,
            |token| {
                let transport = TelegramTransport::new(token, poll_timeout)?;
                Ok(Arc::new(transport) as Arc<dyn ChatTransport>)
            },
            camera,
        )
        .await
    }

    /// Wire every component together and start the loops.
    ///
    /// `connect` builds the transport once the token is known.
    pub async fn assemble<F>(
        config: &Config,
        store: Store,
        connect: F,
        camera: Arc<dyn Camera>,
    ) -> Result<Self>
    where
        F: FnOnce(&str) -> Result<Arc<dyn ChatTransport>>,
    {
        if !store.exists(TELEGRAM_KEY).await? {
            info!("Empty store, running first start");
        }
        let allowed = Arc::new(load_allowed_chats(&store, config).await?);
        info!("Allowed chats: {:?}", allowed.list().await);

        let saved: Vec<Reminder> = store
            .load_object(REMINDERS_KEY)
            .await
            .context("Failed to load saved reminders")?
            .unwrap_or_default();

        let token = resolve_token(&store, config).await?;
        let transport = connect(&token)?;
        let bot_name = transport
            .identify()
            .await
            .context("Failed to verify the bot credential")?;
        info!("Connected as {}", bot_name);

        let messenger = Messenger::new(transport.clone(), allowed.clone());
        messenger.broadcast_text("Bot is now online").await;

        let shutdown = ShutdownSignal::new();
        let routines_switch = Switch::new();
        let routines = Arc::new(RoutineScheduler::new(
            routines_switch.clone(),
            config.routines.tick_interval(),
            config.routines.max_failures,
        ));
        let router = Arc::new(CommandRouter::new(
            CommandTable::build(&config.commands)?,
            allowed.clone(),
            routines.clone(),
            messenger.clone(),
            camera.clone(),
            shutdown.clone(),
        ));

        for reminder in saved {
            routines.schedule_reminder(reminder, messenger.clone()).await;
        }
        info!("{} routines pending", routines.len().await);

        let mut switches = vec![routines_switch];
        let mut handles = vec![tokio::spawn(
            routines.clone().run().instrument(info_span!("routines")),
        )];

        let updates_switch = Switch::new();
        let consumer = Arc::new(UpdateConsumer::new(
            transport,
            allowed.clone(),
            router.clone(),
            updates_switch.clone(),
            config.telegram.poll_timeout(),
            config.telegram.retry_backoff(),
        ));
        switches.push(updates_switch);
        handles.push(tokio::spawn(consumer.run().instrument(info_span!("updates"))));

        if config.console.enabled {
            let console_switch = Switch::new();
            let panel = ControlPanel::new(
                ConsoleInputPort::stdin(),
                router,
                console_switch.clone(),
                config.console.read_timeout(),
            );
            switches.push(console_switch);
            handles.push(tokio::spawn(panel.run().instrument(info_span!("console"))));
        }

        let mut cron = CronScheduler::new().await?;
        register_maintenance_jobs(
            &mut cron,
            &config.maintenance,
            store.clone(),
            allowed.clone(),
        )
        .await?;
        cron.start().await?;

        let join_timeout = config
            .telegram
            .poll_timeout()
            .max(config.console.read_timeout())
            + SHUTDOWN_GRACE;

        info!("Controller started");
        Ok(Self {
            store,
            allowed,
            routines,
            camera,
            shutdown,
            switches,
            handles,
            cron,
            join_timeout,
            bot_name,
        })
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Block until `poweroff` or Ctrl-C
    pub async fn run_until_shutdown(&self) {
        tokio::select! {
            _ = self.shutdown.wait() => info!("Shutdown requested"),
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("Interrupted, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    }

    /// Stop every loop, then save state.
    ///
    /// Loops are joined before anything is persisted: a reminder that is
    /// mid-delivery must be removed from the list before the snapshot.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down...");
        for switch in &self.switches {
            switch.turn_off();
        }

        for handle in self.handles.drain(..) {
            match tokio::time::timeout(self.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Loop task failed: {}", e),
                Err(_) => warn!("Loop did not stop within {:?}", self.join_timeout),
            }
        }

        if let Err(e) = self.cron.shutdown().await {
            warn!("{:#}", e);
        }

        if self.camera.motion_detection() {
            if let Err(e) = self.camera.set_motion_detection(false).await {
                warn!("Failed to disable motion detection: {:#}", e);
            }
        }

        persist_allowed_chats(&self.store, &self.allowed).await?;
        let pending = self.routines.pending_reminders().await;
        self.store
            .save_object(REMINDERS_KEY, &pending)
            .await
            .context("Failed to save pending reminders")?;
        info!("Saved {} pending reminders", pending.len());

        info!("Shutdown complete");
        Ok(())
    }
}
