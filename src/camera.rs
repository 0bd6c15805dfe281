use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::CameraConfig;

/// The camera as seen by the command layer
#[async_trait]
pub trait Camera: Send + Sync {
    /// Most recent frame as encoded image bytes, if one exists
    async fn last_shot(&self) -> Result<Option<Vec<u8>>>;

    async fn set_motion_detection(&self, enabled: bool) -> Result<()>;

    fn motion_detection(&self) -> bool;
}

/// Camera backed by an external capture process.
///
/// The capture process keeps `snapshot_path` up to date; motion detection is
/// switched through optional shell hooks run with `sh -c`.
pub struct SnapshotCamera {
    snapshot_path: PathBuf,
    motion_on_command: Option<String>,
    motion_off_command: Option<String>,
    motion: AtomicBool,
}

impl SnapshotCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            snapshot_path: config.snapshot_path.clone(),
            motion_on_command: config.motion_on_command.clone(),
            motion_off_command: config.motion_off_command.clone(),
            motion: AtomicBool::new(false),
        }
    }

    async fn run_hook(command: &str) -> Result<()> {
        info!("Running camera hook: {}", command);
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .with_context(|| format!("Failed to execute camera hook: {}", command))?;

        if !output.status.success() {
            anyhow::bail!(
                "Camera hook exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Camera for SnapshotCamera {
    async fn last_shot(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No snapshot at {}", self.snapshot_path.display());
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read snapshot: {}", self.snapshot_path.display())
            }),
        }
    }

    async fn set_motion_detection(&self, enabled: bool) -> Result<()> {
        let hook = if enabled {
            &self.motion_on_command
        } else {
            &self.motion_off_command
        };
        if let Some(command) = hook {
            Self::run_hook(command).await?;
        }

        self.motion.store(enabled, Ordering::SeqCst);
        info!(
            "Motion detection {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    fn motion_detection(&self) -> bool {
        self.motion.load(Ordering::SeqCst)
    }
}
