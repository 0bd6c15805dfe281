use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::auth::AuthorizationStore;
use crate::config::MaintenanceConfig;
use crate::runtime::persist_allowed_chats;
use crate::scheduler::cron::CronScheduler;
use crate::storage::Store;

/// Register the heartbeat and the allowed-chats backup
pub async fn register_maintenance_jobs(
    cron: &mut CronScheduler,
    config: &MaintenanceConfig,
    store: Store,
    allowed: Arc<AuthorizationStore>,
) -> Result<()> {
    cron.add_job("heartbeat", &config.heartbeat_cron, || async {
        info!("Heartbeat: controller is alive");
        Ok::<(), anyhow::Error>(())
    })
    .await?;

    // Shutdown persists too; this bounds what a crash can lose
    cron.add_job("allowed-chats-backup", &config.backup_cron, move || {
        let store = store.clone();
        let allowed = allowed.clone();
        async move { persist_allowed_chats(&store, &allowed).await }
    })
    .await?;

    Ok(())
}
