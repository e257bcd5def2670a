//! Cron wiring: registers every active schedule with the scheduler
//! engine and dispatches firings to the coordinator.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::storage::Storage;

use super::PipelineCoordinator;

/// Start the scheduler with every active schedule registered.
///
/// Schedules with invalid cron expressions are skipped with a warning;
/// admission validation in the management layer should have rejected
/// them already.
pub async fn start_scheduler(
    coordinator: Arc<PipelineCoordinator>,
    storage: Arc<dyn Storage>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let schedules = storage.list_active_schedules().await?;
    let mut registered = 0usize;

    for schedule in schedules {
        if let Err(reason) = schedule.validate() {
            warn!(schedule = %schedule.name, %reason, "skipping schedule");
            continue;
        }

        let cron = schedule.normalized_cron();
        let coordinator = Arc::clone(&coordinator);
        let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let coordinator = Arc::clone(&coordinator);
            let schedule = schedule.clone();
            Box::pin(async move {
                if let Err(e) = coordinator.run_schedule(&schedule).await {
                    error!(schedule = %schedule.name, error = %e, "scheduled job failed");
                }
            })
        });

        match job {
            Ok(job) => {
                scheduler.add(job).await?;
                registered += 1;
            }
            Err(e) => {
                warn!(cron = %cron, error = %e, "cron expression rejected by scheduler");
            }
        }
    }

    scheduler.start().await?;
    info!(registered, "scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Orchestrator;
    use crate::matcher::{default_taxonomy, KeywordMatcher};
    use crate::pipeline::CoordinatorConfig;
    use crate::storage::MemoryStore;
    use crate::testing::{MockFetcher, MockNotifier};
    use crate::types::{JobKind, Schedule};

    #[tokio::test]
    async fn invalid_schedules_are_skipped_at_startup() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed_schedules(vec![
            Schedule::new("good", "0 * * * *", JobKind::Process),
            Schedule::new("bad", "not a cron line at all", JobKind::Crawl),
        ]);

        let coordinator = Arc::new(PipelineCoordinator::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::new(Orchestrator::with_clients(vec![])),
            Arc::new(KeywordMatcher::new(&default_taxonomy(), None, false)),
            Arc::new(MockNotifier::new()),
            CoordinatorConfig::default(),
        )
        .with_fetcher(Arc::new(MockFetcher::new())));

        // The malformed schedule must not poison startup.
        let scheduler = start_scheduler(coordinator, storage as Arc<dyn Storage>).await;
        assert!(scheduler.is_ok());
    }
}
