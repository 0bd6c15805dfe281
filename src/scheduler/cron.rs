use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

/// Periodic maintenance jobs on cron expressions (seconds field first).
///
/// Jobs are fallible; a failed run is logged and the job stays scheduled.
pub struct CronScheduler {
    jobs: JobScheduler,
    names: Vec<String>,
}

impl CronScheduler {
    pub async fn new() -> Result<Self> {
        let jobs = JobScheduler::new()
            .await
            .context("Failed to create maintenance scheduler")?;
        Ok(Self {
            jobs,
            names: Vec::new(),
        })
    }

    pub async fn add_job<F, Fut>(&mut self, name: &str, cron_expr: &str, task: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_id, _scheduler| {
            let run = task();
            let name = job_name.clone();
            Box::pin(async move {
                let started = Instant::now();
                match run.await {
                    Ok(()) => debug!("Maintenance job '{}' done in {:?}", name, started.elapsed()),
                    Err(e) => error!("Maintenance job '{}' failed: {:#}", name, e),
                }
            })
        })
        .with_context(|| format!("Invalid cron expression {:?} for job '{}'", cron_expr, name))?;

        self.jobs
            .add(job)
            .await
            .with_context(|| format!("Failed to register job '{}'", name))?;
        self.names.push(name.to_string());
        info!("Registered maintenance job '{}' ({})", name, cron_expr);
        Ok(())
    }

    pub fn job_names(&self) -> &[String] {
        &self.names
    }

    pub async fn start(&self) -> Result<()> {
        self.jobs
            .start()
            .await
            .context("Failed to start maintenance scheduler")?;
        info!("Maintenance jobs running: {:?}", self.job_names());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.jobs
            .shutdown()
            .await
            .context("Failed to stop maintenance scheduler")?;
        info!("Maintenance jobs stopped");
        Ok(())
    }
}
