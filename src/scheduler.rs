use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::db::Store;

/// Background reclamation of expired query records. Reads already
/// exclude rows past their TTL, so this only bounds table growth;
/// the orchestration path never depends on it running.
pub struct Scheduler {
    store: Store,
    config: RetentionConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Store, config: RetentionConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = self.config.purge_cron.clone() {
            self.run_with_cron(&cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let store = self.store.clone();
        let running = Arc::clone(&self.running);

        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let store = store.clone();
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                if let Err(e) = purge_expired(&store).await {
                    error!("Scheduled purge failed: {}", e);
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let interval_mins = self.config.purge_interval_minutes;

        info!("Scheduler purging every {} minutes", interval_mins);

        let mut purge_interval = interval(Duration::from_secs(u64::from(interval_mins) * 60));

        loop {
            purge_interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            if let Err(e) = purge_expired(&self.store).await {
                error!("Scheduled purge failed: {}", e);
            }
        }

        Ok(())
    }

    /// Single purge pass, used by the CLI and tests.
    pub async fn run_once(&self) -> Result<u64> {
        purge_expired(&self.store).await
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }
}

async fn purge_expired(store: &Store) -> Result<u64> {
    let purged = store.purge_expired_queries(Utc::now().timestamp()).await?;
    Ok(purged)
}
