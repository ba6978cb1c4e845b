//! Periodic sync of every known tenant.

use crate::{SyncCompletion, SyncScheduler};
use std::time::Duration;
use sync_protocol_types::SyncOptions;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Requests an incremental sync for each registered tenant on every tick.
pub struct AutoSyncTimer {
    scheduler: SyncScheduler,
    interval: Duration,
}

impl AutoSyncTimer {
    pub fn new(scheduler: SyncScheduler, interval: Duration) -> Self {
        Self {
            scheduler,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one tick now: queue a sync per known tenant, then drain.
    pub fn tick(&self) -> Vec<SyncCompletion> {
        let tenants = self.scheduler.registry().list_known_tenant_ids();
        debug!(tenants = tenants.len(), "Auto-sync tick");

        let completions = tenants
            .into_iter()
            .map(|tenant_id| self.scheduler.sync(tenant_id, SyncOptions::default()))
            .collect();
        self.scheduler.drain();
        completions
    }

    /// Spawn the timer. The first tick fires one interval from now.
    pub fn start(self) -> AutoSyncHandle {
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let completions = self.tick();
                tokio::spawn(report_failures(completions));
            }
        });

        AutoSyncHandle { task, period }
    }
}

/// Failures of auto-sync runs are logged and otherwise dropped.
async fn report_failures(completions: Vec<SyncCompletion>) {
    for completion in completions {
        let tenant_id = completion.tenant_id().clone();
        if let Err(e) = completion.await {
            warn!(tenant_id = %tenant_id, error = %e, "Auto-sync failed");
        }
    }
}

/// Running auto-sync timer. Dropping it stops the timer.
pub struct AutoSyncHandle {
    task: JoinHandle<()>,
    period: Duration,
}

impl AutoSyncHandle {
    pub fn interval(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop ticking. Syncs already requested still run.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
