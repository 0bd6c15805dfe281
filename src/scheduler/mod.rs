pub mod cron;
pub mod reminders;
pub mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::runtime::Switch;
use reminders::Reminder;

pub type RoutineFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Work bound to a routine; invoked once per attempt
pub type RoutineAction = Arc<dyn Fn() -> RoutineFuture + Send + Sync>;

/// Unique handle of a scheduled routine. Names may repeat, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutineId(u64);

/// A deferred, fire-once action
pub struct Routine {
    id: RoutineId,
    name: String,
    trigger_time: NaiveDateTime,
    action: RoutineAction,
    /// Accepted for compatibility; fired routines are never rescheduled
    #[allow(dead_code)]
    recurring: bool,
    failures: u32,
    /// Set when the routine was created from a reminder, so it can be saved
    reminder: Option<Reminder>,
}

/// How to pick the routine to remove
#[derive(Debug, Clone, PartialEq)]
pub enum RoutineSelector {
    Name(String),
    #[allow(dead_code)]
    Id(RoutineId),
    Position(usize),
}

impl RoutineSelector {
    /// Digits select a position, anything else a name
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<usize>() {
            Ok(pos) => RoutineSelector::Position(pos),
            Err(_) => RoutineSelector::Name(text.trim().to_string()),
        }
    }
}

/// Holds pending routines and fires them from its own loop
pub struct RoutineScheduler {
    routines: Mutex<Vec<Routine>>,
    next_id: AtomicU64,
    switch: Switch,
    tick_interval: Duration,
    max_failures: u32,
}

impl RoutineScheduler {
    pub fn new(switch: Switch, tick_interval: Duration, max_failures: u32) -> Self {
        info!("Initializing RoutineScheduler...");
        Self {
            routines: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            switch,
            tick_interval,
            max_failures,
        }
    }

    /// Add a routine that runs `action` once `trigger_time` has passed.
    /// Reminders go through `schedule_reminder` so they can be saved.
    #[allow(dead_code)]
    pub async fn add<F, Fut>(
        &self,
        name: &str,
        trigger_time: NaiveDateTime,
        recurring: bool,
        action: F,
    ) -> RoutineId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action: RoutineAction = Arc::new(move || -> RoutineFuture { Box::pin(action()) });
        self.insert(name, trigger_time, recurring, action, None).await
    }

    async fn insert(
        &self,
        name: &str,
        trigger_time: NaiveDateTime,
        recurring: bool,
        action: RoutineAction,
        reminder: Option<Reminder>,
    ) -> RoutineId {
        let id = RoutineId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut routines = self.routines.lock().await;
        routines.push(Routine {
            id,
            name: name.to_string(),
            trigger_time,
            action,
            recurring,
            failures: 0,
            reminder,
        });
        debug!("Added routine '{}' for {}", name, trigger_time);
        id
    }

    pub async fn remove(&self, selector: &RoutineSelector) -> bool {
        let mut routines = self.routines.lock().await;
        let pos = match selector {
            RoutineSelector::Name(name) => routines.iter().position(|r| &r.name == name),
            RoutineSelector::Id(id) => routines.iter().position(|r| r.id == *id),
            RoutineSelector::Position(pos) => Some(*pos).filter(|pos| *pos < routines.len()),
        };

        match pos {
            Some(pos) => {
                let routine = routines.remove(pos);
                debug!("Removed routine '{}' at position {}", routine.name, pos);
                true
            }
            None => {
                warn!("Could not remove the routine: no match for {:?}", selector);
                false
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.routines.lock().await.len()
    }

    pub async fn names(&self) -> Vec<String> {
        let routines = self.routines.lock().await;
        routines.iter().map(|r| r.name.clone()).collect()
    }

    /// Human-readable listing of pending routine names
    pub async fn describe(&self) -> String {
        let names = self.names().await;
        if names.is_empty() {
            return "no routines".to_string();
        }
        format!("Routines:\n{}", names.join("\n"))
    }

    /// Reminders still waiting to fire, for saving across restarts
    pub async fn pending_reminders(&self) -> Vec<Reminder> {
        let routines = self.routines.lock().await;
        routines.iter().filter_map(|r| r.reminder.clone()).collect()
    }

    /// Run every routine due at `now`. Returns how many fired successfully.
    ///
    /// Actions run without the list lock held; a successful routine is then
    /// removed by id, so a manual removal in between is harmless.
    pub async fn tick(&self, now: NaiveDateTime) -> usize {
        let due: Vec<(RoutineId, String, RoutineAction)> = {
            let routines = self.routines.lock().await;
            routines
                .iter()
                .filter(|r| r.trigger_time <= now)
                .map(|r| (r.id, r.name.clone(), r.action.clone()))
                .collect()
        };

        let mut fired = 0;
        for (id, name, action) in due {
            let outcome = action().await;
            let mut routines = self.routines.lock().await;
            let pos = routines.iter().position(|r| r.id == id);

            match outcome {
                Ok(()) => {
                    fired += 1;
                    if let Some(pos) = pos {
                        routines.remove(pos);
                    }
                    info!("Successfully executed '{}' routine", name);
                }
                Err(e) => {
                    let Some(pos) = pos else {
                        continue;
                    };
                    routines[pos].failures += 1;
                    let failures = routines[pos].failures;
                    if self.max_failures > 0 && failures >= self.max_failures {
                        routines.remove(pos);
                        error!(
                            "Giving up on '{}' routine after {} failures: {:#}",
                            name, failures, e
                        );
                    } else {
                        error!("Failed to run '{}' routine (attempt {}): {:#}", name, failures, e);
                    }
                }
            }
        }

        fired
    }

    pub async fn run(self: Arc<Self>) {
        info!("Routine scheduler started");
        while self.switch.is_on() {
            self.tick(Local::now().naive_local()).await;
            tokio::time::sleep(self.tick_interval).await;
        }
        info!("Routine scheduler stopped");
    }
}
