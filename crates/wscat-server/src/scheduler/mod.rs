//! Background job scheduler.
//!
//! Registers the recurring sync runs named in the configuration plus a
//! frequent override feed refresh, so request handlers rarely pay for a
//! reparse.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use wscat_catalog::{OverrideCache, SyncError, SyncOrchestrator};
use wscat_core::{AppConfig, SyncRunStatus, SyncRunType, TriggerSource};

/// Every 30 seconds.
const OVERRIDE_REFRESH_CRON: &str = "*/30 * * * * *";

/// Sync jobs enabled by `config`, as `(run type, cron expression)` pairs.
pub fn scheduled_sync_jobs(config: &AppConfig) -> Vec<(SyncRunType, String)> {
    [
        (SyncRunType::Incremental, config.sync_incremental_cron.as_ref()),
        (SyncRunType::Stock, config.sync_stock_cron.as_ref()),
    ]
    .into_iter()
    .filter_map(|(run_type, cron)| {
        cron.map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| (run_type, c.to_owned()))
    })
    .collect()
}

/// Builds and starts the scheduler. The returned handle must be kept alive
/// for the lifetime of the process; dropping it stops every job.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    orchestrator: SyncOrchestrator,
    overrides: Arc<OverrideCache>,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for (run_type, cron) in scheduled_sync_jobs(config) {
        register_sync_job(&scheduler, orchestrator.clone(), run_type, &cron).await?;
        tracing::info!(run_type = %run_type, cron = %cron, "scheduled sync job registered");
    }
    register_override_refresh_job(&scheduler, overrides).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_sync_job(
    scheduler: &JobScheduler,
    orchestrator: SyncOrchestrator,
    run_type: SyncRunType,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            run_scheduled_sync(&orchestrator, run_type).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_scheduled_sync(orchestrator: &SyncOrchestrator, run_type: SyncRunType) {
    tracing::info!(run_type = %run_type, "scheduler: starting sync run");
    match orchestrator.run(run_type, TriggerSource::Scheduler).await {
        Ok(run) if run.status == SyncRunStatus::Failed => tracing::error!(
            run_id = run.id,
            run_type = %run_type,
            error = run.error_message.as_deref().unwrap_or_default(),
            "scheduler: sync run failed"
        ),
        Ok(run) => tracing::info!(
            run_id = run.id,
            run_type = %run_type,
            status = %run.status,
            fetched = run.fetched_count,
            upserted = run.upserted_count,
            errors = run.error_count,
            skipped = run.skipped_count,
            "scheduler: sync run complete"
        ),
        Err(SyncError::AlreadyRunning) => tracing::info!(
            run_type = %run_type,
            "scheduler: another sync run is in progress; skipping this tick"
        ),
        Err(e) => tracing::error!(
            run_type = %run_type,
            error = %e,
            "scheduler: sync run could not be recorded"
        ),
    }
}

async fn register_override_refresh_job(
    scheduler: &JobScheduler,
    overrides: Arc<OverrideCache>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(OVERRIDE_REFRESH_CRON, move |_uuid, _lock| {
        let overrides = Arc::clone(&overrides);
        Box::pin(async move {
            overrides.refresh_if_stale().await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use wscat_core::build_app_config;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let mut all = vec![("DATABASE_URL", "postgres://localhost/wscat")];
        all.extend_from_slice(vars);
        build_app_config(|key| {
            all.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap()
    }

    #[test]
    fn defaults_schedule_incremental_and_stock_runs() {
        let jobs = scheduled_sync_jobs(&config(&[]));
        assert_eq!(
            jobs,
            vec![
                (SyncRunType::Incremental, "0 */15 * * * *".to_string()),
                (SyncRunType::Stock, "0 */5 * * * *".to_string()),
            ]
        );
    }

    #[test]
    fn disabled_crons_schedule_nothing() {
        let jobs = scheduled_sync_jobs(&config(&[
            ("WSCAT_SYNC_INCREMENTAL_CRON", "off"),
            ("WSCAT_SYNC_STOCK_CRON", ""),
        ]));
        assert!(jobs.is_empty());
    }

    #[test]
    fn configured_crons_become_jobs() {
        let jobs = scheduled_sync_jobs(&config(&[
            ("WSCAT_SYNC_INCREMENTAL_CRON", "0 0 * * * *"),
            ("WSCAT_SYNC_STOCK_CRON", "0 */10 * * * *"),
        ]));
        assert_eq!(
            jobs,
            vec![
                (SyncRunType::Incremental, "0 0 * * * *".to_string()),
                (SyncRunType::Stock, "0 */10 * * * *".to_string()),
            ]
        );
    }

    #[test]
    fn override_refresh_cron_is_valid() {
        assert!(Job::new_async(OVERRIDE_REFRESH_CRON, |_uuid, _lock| Box::pin(async {})).is_ok());
    }
}
