use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::orchestrator::{CancelToken, SyncOrchestrator};
use crate::utils::error::{AppError, Result};

/// Periodic driver: runs a store-sync pass and a scrape pass on the
/// configured cron interval. Thin glue over the orchestrator entry points.
pub struct SyncScheduler {
    scheduler: JobScheduler,
    orchestrator: SyncOrchestrator,
    config: SchedulerConfig,
}

impl SyncScheduler {
    pub async fn new(orchestrator: SyncOrchestrator, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Internal(format!("failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, orchestrator, config })
    }

    pub async fn start(&mut self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("scheduler disabled by configuration");
            return Ok(());
        }

        // Config uses the classic 5-field form; the scheduler wants seconds
        let expression = format!("0 {}", self.config.sync_interval);
        let orchestrator = self.orchestrator.clone();

        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                let cancel = CancelToken::new();

                match orchestrator.sync_all(&cancel).await {
                    Ok(run) => tracing::info!(
                        succeeded = run.succeeded,
                        failed = run.failed,
                        skipped = run.skipped,
                        "scheduled store sync finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "scheduled store sync failed to start"),
                }

                match orchestrator.scrape_all(None, &cancel).await {
                    Ok(run) => tracing::info!(
                        succeeded = run.succeeded,
                        failed = run.failed,
                        "scheduled scrape finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "scheduled scrape failed to start"),
                }
            })
        })
        .map_err(|e| AppError::Internal(format!("invalid sync_interval: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Internal(format!("failed to add sync job: {}", e)))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Internal(format!("failed to start scheduler: {}", e)))?;

        tracing::info!(interval = %self.config.sync_interval, "sync scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Internal(format!("failed to stop scheduler: {}", e)))?;
        tracing::info!("sync scheduler shutdown");
        Ok(())
    }
}
